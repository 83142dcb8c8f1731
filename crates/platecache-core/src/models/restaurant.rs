use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wire;
use crate::store::{Collection, StoreRecord};

/// Photograph id used when a restaurant has none.
pub const FALLBACK_PHOTOGRAPH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub neighborhood: String,
    #[serde(
        default,
        deserialize_with = "wire::lenient_opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub photograph: Option<u32>,
    #[serde(default)]
    pub address: String,
    pub latlng: LatLng,
    pub cuisine_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub operating_hours: BTreeMap<String, String>,
    /// `"true"` or `"false"`; kept as a string so stored records match the server's.
    #[serde(default = "default_flag", deserialize_with = "wire::flag_string")]
    pub is_favorite: String,
    #[serde(
        rename = "createdAt",
        default,
        deserialize_with = "wire::timestamp_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "updatedAt",
        default,
        deserialize_with = "wire::timestamp_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_flag() -> String {
    "false".to_string()
}

impl Restaurant {
    pub fn is_favorite(&self) -> bool {
        self.is_favorite == "true"
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        self.is_favorite = favorite.to_string();
    }

    pub fn photograph_id(&self) -> u32 {
        self.photograph.unwrap_or(FALLBACK_PHOTOGRAPH)
    }

    /// Relative URL of the restaurant detail page.
    pub fn page_url(&self) -> String {
        format!("./restaurant.html?id={}", self.id)
    }

    pub fn image_url(&self) -> String {
        format!("/img/{}.jpg", self.photograph_id())
    }

    pub fn map_marker(&self) -> MapMarker {
        MapMarker {
            lat: self.latlng.lat,
            lng: self.latlng.lng,
            title: self.name.clone(),
            url: self.page_url(),
        }
    }
}

impl StoreRecord for Restaurant {
    const COLLECTION: Collection = Collection::Restaurants;

    fn key(&self) -> i64 {
        self.id
    }
}

/// Everything a map needs to place a restaurant pin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    pub url: String,
}
