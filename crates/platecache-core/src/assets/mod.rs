//! Generational cache for the application's static assets.
//!
//! The `AssetCacheManager` keeps one named generation of cached responses
//! for the application shell. Installing a generation fetches the whole
//! manifest up front, activating it deletes every other generation, and
//! each request is answered from the cache when possible and from the
//! network otherwise (storing what the network returned).

pub mod error;
pub mod manager;
pub mod manifest;
pub mod storage;

pub use error::AssetError;
pub use manager::{AssetCacheManager, AssetResponse, ResponseSource, WorkerState};
pub use storage::{AssetCache, CacheStorage, CachedResponse};
