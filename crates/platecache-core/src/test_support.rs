//! Record builders shared by unit tests.

use crate::models::{LatLng, Restaurant, Review};

pub fn restaurant(id: i64, cuisine: &str, neighborhood: &str) -> Restaurant {
    Restaurant {
        id,
        name: format!("Restaurant {}", id),
        neighborhood: neighborhood.to_string(),
        photograph: Some(id as u32),
        address: format!("{} Main St", id),
        latlng: LatLng {
            lat: 40.7,
            lng: -73.9,
        },
        cuisine_type: cuisine.to_string(),
        operating_hours: Default::default(),
        is_favorite: "false".to_string(),
        created_at: None,
        updated_at: None,
    }
}

pub fn review(id: i64, restaurant_id: i64, name: &str) -> Review {
    Review {
        id,
        restaurant_id,
        name: name.to_string(),
        rating: 4,
        comments: "Solid".to_string(),
        created_at: None,
        updated_at: None,
    }
}
