//! Core library for platecache.
//!
//! Provides the offline-first data layer for the restaurant directory:
//!
//! - `api`: HTTP client for the restaurants/reviews backend
//! - `store`: versioned on-disk object store mirroring server records
//! - `queue`: single-slot durable queue for reviews written while offline
//! - `data`: the `DataAccessLayer` service used by front ends
//! - `assets`: generational cache for the application's static assets

pub mod api;
pub mod assets;
pub mod config;
pub mod connectivity;
pub mod data;
pub mod models;
pub mod queue;
pub mod store;

pub use api::{ApiClient, ApiError};
pub use assets::{AssetCacheManager, AssetError, AssetResponse, WorkerState};
pub use config::Config;
pub use connectivity::Connectivity;
pub use data::{DataAccessLayer, DataError, ReviewSubmission};
pub use models::{LatLng, MapMarker, NewReview, Restaurant, Review};
pub use queue::OfflineWriteQueue;
pub use store::{Collection, PersistentStore, StoreRecord};

#[cfg(test)]
mod test_support;
