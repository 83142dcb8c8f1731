use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Collection, StoreRecord};

/// Latest schema version this build knows how to open.
pub const SCHEMA_VERSION: u32 = 2;

/// Collection added by each upgrade step; index is the version upgraded from.
const UPGRADES: [Collection; SCHEMA_VERSION as usize] = [Collection::Restaurants, Collection::Reviews];

/// Schema metadata file inside the database directory
const META_FILE: &str = "meta.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Meta {
    version: u32,
}

type Rows = BTreeMap<i64, Value>;

struct Database {
    dir: PathBuf,
    version: u32,
    // Serializes read-modify-write of collection files
    lock: Mutex<()>,
}

/// Handle to the local database. Cheap to share behind an `Arc`.
pub struct PersistentStore {
    db: Option<Database>,
}

impl PersistentStore {
    /// Open (creating and upgrading as needed) the database `name` under `root`.
    ///
    /// Degrades to a no-op handle when `root` is `None` or the database
    /// cannot be opened, so callers never have to handle an open failure.
    pub fn open(root: Option<&Path>, name: &str) -> Self {
        let Some(root) = root else {
            info!(database = name, "Local store unavailable, using no-op store");
            return Self::disabled();
        };

        match Database::open(&root.join(name)) {
            Ok(db) => {
                debug!(database = name, version = db.version, "Local store opened");
                Self { db: Some(db) }
            }
            Err(e) => {
                warn!(database = name, error = %e, "Failed to open local store, using no-op store");
                Self::disabled()
            }
        }
    }

    /// A store where every read is empty and every write is dropped.
    pub fn disabled() -> Self {
        Self { db: None }
    }

    pub fn is_available(&self) -> bool {
        self.db.is_some()
    }

    pub fn version(&self) -> Option<u32> {
        self.db.as_ref().map(|db| db.version)
    }

    pub fn get<T: StoreRecord>(&self, id: i64) -> Result<Option<T>> {
        let Some(db) = &self.db else { return Ok(None) };
        let _guard = db.guard()?;
        let rows = db.load(T::COLLECTION)?;
        rows.get(&id)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .with_context(|| format!("Corrupt record {} in {}", id, T::COLLECTION))
            })
            .transpose()
    }

    /// All records of a collection in key order.
    pub fn get_all<T: StoreRecord>(&self) -> Result<Vec<T>> {
        let Some(db) = &self.db else { return Ok(Vec::new()) };
        let _guard = db.guard()?;
        db.load(T::COLLECTION)?
            .into_iter()
            .map(|(id, value)| {
                serde_json::from_value(value)
                    .with_context(|| format!("Corrupt record {} in {}", id, T::COLLECTION))
            })
            .collect()
    }

    /// Insert or replace a record by key.
    pub fn put<T: StoreRecord>(&self, record: &T) -> Result<()> {
        let Some(db) = &self.db else { return Ok(()) };
        let value = serde_json::to_value(record)?;
        let _guard = db.guard()?;
        let mut rows = db.load(T::COLLECTION)?;
        rows.insert(record.key(), value);
        db.save(T::COLLECTION, &rows)
    }

    pub fn count(&self, collection: Collection) -> Result<usize> {
        let Some(db) = &self.db else { return Ok(0) };
        let _guard = db.guard()?;
        Ok(db.load(collection)?.len())
    }
}

impl Database {
    fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;

        let db = Self {
            dir: dir.to_path_buf(),
            version: 0,
            lock: Mutex::new(()),
        };
        let version = db.upgrade()?;
        Ok(Self { version, ..db })
    }

    /// Apply each missing upgrade step in order. Steps only add collections.
    fn upgrade(&self) -> Result<u32> {
        let meta = self.load_meta()?;
        if meta.version > SCHEMA_VERSION {
            bail!(
                "database version {} is newer than supported version {}",
                meta.version,
                SCHEMA_VERSION
            );
        }

        for from in meta.version..SCHEMA_VERSION {
            let collection = UPGRADES[from as usize];
            let path = self.collection_path(collection);
            if !path.exists() {
                write_json(&path, &Rows::new())?;
            }
            info!(from, to = from + 1, %collection, "Upgraded local database");
        }

        if meta.version < SCHEMA_VERSION {
            write_json(&self.dir.join(META_FILE), &Meta { version: SCHEMA_VERSION })?;
        }
        Ok(SCHEMA_VERSION)
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| anyhow!("local store lock poisoned"))
    }

    fn load_meta(&self) -> Result<Meta> {
        let path = self.dir.join(META_FILE);
        if !path.exists() {
            return Ok(Meta::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read database metadata")?;
        serde_json::from_str(&contents).context("Failed to parse database metadata")
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    fn load(&self, collection: Collection) -> Result<Rows> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Rows::new());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read collection: {}", collection))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse collection: {}", collection))
    }

    fn save(&self, collection: Collection, rows: &Rows) -> Result<()> {
        write_json(&self.collection_path(collection), rows)
            .with_context(|| format!("Failed to write collection: {}", collection))
    }
}

/// Write via a temp file and rename so a crash never leaves half a file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Restaurant, Review};
    use crate::test_support::{restaurant, review};

    fn open_temp() -> (tempfile::TempDir, PersistentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(Some(dir.path()), "restaurants");
        (dir, store)
    }

    #[test]
    fn test_fresh_database_is_at_latest_version() {
        let (dir, store) = open_temp();
        assert!(store.is_available());
        assert_eq!(store.version(), Some(SCHEMA_VERSION));
        assert!(dir.path().join("restaurants/restaurantStore.json").exists());
        assert!(dir.path().join("restaurants/reviewsStore.json").exists());
        assert_eq!(store.count(Collection::Restaurants).unwrap(), 0);
        assert_eq!(store.count(Collection::Reviews).unwrap(), 0);
    }

    #[test]
    fn test_put_is_idempotent_upsert() {
        let (_dir, store) = open_temp();
        let mut r = restaurant(7, "Thai", "Queens");
        store.put(&r).unwrap();
        r.name = "Renamed".to_string();
        r.set_favorite(true);
        store.put(&r).unwrap();

        assert_eq!(store.count(Collection::Restaurants).unwrap(), 1);
        let stored: Restaurant = store.get(7).unwrap().expect("record should exist");
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.is_favorite, "true");
    }

    #[test]
    fn test_get_all_in_key_order_and_get_missing() {
        let (_dir, store) = open_temp();
        for id in [3, 1, 2] {
            store.put(&restaurant(id, "Pizza", "Brooklyn")).unwrap();
        }
        let ids: Vec<i64> = store.get_all::<Restaurant>().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(store.get::<Restaurant>(99).unwrap().is_none());
    }

    #[test]
    fn test_collections_are_independent() {
        let (_dir, store) = open_temp();
        store.put(&restaurant(1, "Pizza", "Brooklyn")).unwrap();
        store.put(&review(1, 1, "Kim")).unwrap();
        store.put(&review(2, 1, "Lee")).unwrap();
        assert_eq!(store.count(Collection::Restaurants).unwrap(), 1);
        assert_eq!(store.count(Collection::Reviews).unwrap(), 2);
        assert_eq!(store.get::<Review>(2).unwrap().unwrap().name, "Lee");
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(Some(dir.path()), "restaurants");
            store.put(&restaurant(5, "Mexican", "Manhattan")).unwrap();
        }
        let store = PersistentStore::open(Some(dir.path()), "restaurants");
        assert_eq!(store.count(Collection::Restaurants).unwrap(), 1);
    }

    #[test]
    fn test_upgrade_from_version_one_adds_reviews_only() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("restaurants");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(db_dir.join(META_FILE), r#"{"version": 1}"#).unwrap();
        let existing = serde_json::json!({ "4": restaurant(4, "Pizza", "Queens") });
        std::fs::write(db_dir.join("restaurantStore.json"), existing.to_string()).unwrap();

        let store = PersistentStore::open(Some(dir.path()), "restaurants");
        assert_eq!(store.version(), Some(2));
        assert_eq!(store.count(Collection::Restaurants).unwrap(), 1);
        assert!(db_dir.join("reviewsStore.json").exists());

        let meta: Meta =
            serde_json::from_str(&std::fs::read_to_string(db_dir.join(META_FILE)).unwrap()).unwrap();
        assert_eq!(meta.version, 2);
    }

    #[test]
    fn test_newer_schema_degrades_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("restaurants");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(db_dir.join(META_FILE), r#"{"version": 9}"#).unwrap();

        let store = PersistentStore::open(Some(dir.path()), "restaurants");
        assert!(!store.is_available());
    }

    #[test]
    fn test_disabled_store_is_noop() {
        let store = PersistentStore::open(None, "restaurants");
        assert!(!store.is_available());
        store.put(&restaurant(1, "Pizza", "Queens")).unwrap();
        assert_eq!(store.count(Collection::Restaurants).unwrap(), 0);
        assert!(store.get::<Restaurant>(1).unwrap().is_none());
        assert!(store.get_all::<Restaurant>().unwrap().is_empty());
    }
}
