use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wire;
use crate::store::{Collection, StoreRecord};

/// A review as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub restaurant_id: i64,
    pub name: String,
    #[serde(deserialize_with = "wire::lenient_u8")]
    pub rating: u8,
    #[serde(default)]
    pub comments: String,
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

impl StoreRecord for Review {
    const COLLECTION: Collection = Collection::Reviews;

    fn key(&self) -> i64 {
        self.id
    }
}

/// A review that has not been accepted by the server yet (no id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub restaurant_id: i64,
    pub name: String,
    pub rating: u8,
    pub comments: String,
}

impl NewReview {
    pub fn new(restaurant_id: i64, name: impl Into<String>, rating: u8, comments: impl Into<String>) -> Self {
        Self {
            restaurant_id,
            name: name.into(),
            rating,
            comments: comments.into(),
        }
    }
}
