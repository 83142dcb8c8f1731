//! Local object store for offline data access.
//!
//! This module provides the `PersistentStore`, a versioned on-disk
//! database mirroring server records. Each collection is a JSON object
//! keyed by record id. Collections:
//! - `restaurantStore`: restaurant records (schema version 1)
//! - `reviewsStore`: review records (schema version 2)
//!
//! When no storage location is available the store opens as a no-op
//! handle: reads come back empty and writes are dropped.

pub mod database;

pub use database::{PersistentStore, SCHEMA_VERSION};

use serde::{de::DeserializeOwned, Serialize};

/// Named collections inside the local database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Restaurants,
    Reviews,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Restaurants => "restaurantStore",
            Collection::Reviews => "reviewsStore",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A record that lives in one collection, keyed by its `id`.
pub trait StoreRecord: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn key(&self) -> i64;
}
