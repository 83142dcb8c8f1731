//! Data models for restaurant directory entities.
//!
//! This module contains the records mirrored from the backend:
//!
//! - `Restaurant`: directory entry with location, cuisine and favorite flag
//! - `Review`, `NewReview`: stored reviews and reviews awaiting submission
//! - `MapMarker`: the single data point handed to map collaborators

pub mod restaurant;
pub mod review;
mod wire;

pub use restaurant::{LatLng, MapMarker, Restaurant, FALLBACK_PHOTOGRAPH};
pub use review::{NewReview, Review};
