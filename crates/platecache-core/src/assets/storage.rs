//! On-disk storage for cache generations.
//!
//! Each generation is a directory under the storage root holding an
//! `index.json` (URL -> entry metadata) and one body file per entry. A
//! generation only counts as installed once its index carries an
//! `installed_at` stamp.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const INDEX_FILE: &str = "index.json";

/// A stored copy of a network response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
            stored_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    file: String,
    status: u16,
    content_type: Option<String>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    next_id: u64,
    #[serde(default)]
    installed_at: Option<DateTime<Utc>>,
    entries: BTreeMap<String, EntryMeta>,
}

/// All cache generations under one root directory.
pub struct CacheStorage {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CacheStorage {
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create asset cache directory {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Names of every generation, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root).context("Failed to list cache generations")? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn has(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.root.join(name).is_dir()
    }

    /// Open a generation, creating it if needed.
    pub fn open(&self, name: &str) -> Result<AssetCache> {
        validate_name(name)?;
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache generation {}", name))?;
        Ok(AssetCache {
            name: name.to_string(),
            dir,
            lock: Arc::clone(&self.lock),
        })
    }

    /// Delete a generation. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        if !self.has(name) {
            return Ok(false);
        }
        let _guard = lock(&self.lock)?;
        std::fs::remove_dir_all(self.root.join(name))
            .with_context(|| format!("Failed to delete cache generation {}", name))?;
        Ok(true)
    }

    /// When `name` finished installing, or `None` if it never did.
    pub fn installed_at(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        if !self.has(name) {
            return Ok(None);
        }
        self.open(name)?.installed_at()
    }

    /// Look `url` up in `preferred` first, then in the other generations by name.
    pub fn match_url(&self, url: &str, preferred: &str) -> Result<Option<CachedResponse>> {
        let mut names = self.keys()?;
        if let Some(pos) = names.iter().position(|n| n == preferred) {
            let first = names.remove(pos);
            names.insert(0, first);
        }
        for name in names {
            if let Some(response) = self.open(&name)?.match_url(url)? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// One cache generation.
pub struct AssetCache {
    name: String,
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl AssetCache {
    pub fn match_url(&self, url: &str) -> Result<Option<CachedResponse>> {
        let _guard = lock(&self.lock)?;
        let index = self.load_index()?;
        let Some(meta) = index.entries.get(url) else {
            return Ok(None);
        };
        let body = std::fs::read(self.dir.join(&meta.file))
            .with_context(|| format!("Failed to read cached body for {}", url))?;
        Ok(Some(CachedResponse {
            status: meta.status,
            content_type: meta.content_type.clone(),
            body,
            stored_at: meta.stored_at,
        }))
    }

    pub fn put(&self, url: &str, response: &CachedResponse) -> Result<()> {
        self.put_all(std::iter::once((url, response)))
    }

    /// Store several entries under one index update.
    pub fn put_all<'a>(&self, entries: impl IntoIterator<Item = (&'a str, &'a CachedResponse)>) -> Result<()> {
        let _guard = lock(&self.lock)?;
        let mut index = self.load_index()?;
        for (url, response) in entries {
            let file = format!("{}.body", index.next_id);
            index.next_id += 1;
            std::fs::write(self.dir.join(&file), &response.body)
                .with_context(|| format!("Failed to write cached body for {}", url))?;

            let meta = EntryMeta {
                file,
                status: response.status,
                content_type: response.content_type.clone(),
                stored_at: response.stored_at,
            };
            if let Some(old) = index.entries.insert(url.to_string(), meta) {
                let _ = std::fs::remove_file(self.dir.join(old.file));
            }
            debug!(generation = %self.name, url, "Stored asset");
        }
        self.save_index(&index)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let _guard = lock(&self.lock)?;
        Ok(self.load_index()?.entries.into_keys().collect())
    }

    /// Stamp the generation as fully installed.
    pub fn mark_installed(&self) -> Result<()> {
        let _guard = lock(&self.lock)?;
        let mut index = self.load_index()?;
        index.installed_at = Some(Utc::now());
        self.save_index(&index)
    }

    pub fn installed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let _guard = lock(&self.lock)?;
        Ok(self.load_index()?.installed_at)
    }

    fn load_index(&self) -> Result<Index> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Index::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read index of {}", self.name))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse index of {}", self.name))
    }

    fn save_index(&self, index: &Index) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(index)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn lock(mutex: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    mutex.lock().map_err(|_| anyhow!("asset cache lock poisoned"))
}

/// Generation names become directory names.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("invalid cache generation name {:?}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> CachedResponse {
        CachedResponse::new(200, Some("text/plain".to_string()), body.as_bytes().to_vec())
    }

    #[test]
    fn test_put_and_match() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path()).unwrap();
        let cache = storage.open("v1").unwrap();

        cache.put("http://site/a", &response("A")).unwrap();
        let hit = cache.match_url("http://site/a").unwrap().expect("entry should exist");
        assert_eq!(hit.body, b"A");
        assert_eq!(hit.content_type.as_deref(), Some("text/plain"));
        assert!(cache.match_url("http://site/b").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_entry_and_body_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path()).unwrap();
        let cache = storage.open("v1").unwrap();

        cache.put("http://site/a", &response("old")).unwrap();
        cache.put("http://site/a", &response("new")).unwrap();
        assert_eq!(cache.keys().unwrap(), vec!["http://site/a"]);
        assert_eq!(cache.match_url("http://site/a").unwrap().unwrap().body, b"new");
        assert!(!dir.path().join("v1/0.body").exists());
    }

    #[test]
    fn test_generations_listed_deleted_and_matched_across() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path()).unwrap();
        storage.open("v7").unwrap().put("http://site/x", &response("x")).unwrap();
        storage.open("v4").unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["v4", "v7"]);
        assert!(storage.match_url("http://site/x", "v4").unwrap().is_some());

        assert!(storage.delete("v4").unwrap());
        assert!(!storage.delete("v4").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["v7"]);
    }

    #[test]
    fn test_preferred_generation_wins_over_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path()).unwrap();
        storage.open("v10").unwrap().put("http://site/a", &response("ten")).unwrap();
        storage.open("v4").unwrap().put("http://site/a", &response("four")).unwrap();

        assert_eq!(storage.match_url("http://site/a", "v4").unwrap().unwrap().body, b"four");
        assert_eq!(storage.match_url("http://site/a", "v10").unwrap().unwrap().body, b"ten");
        assert_eq!(storage.match_url("http://site/a", "v99").unwrap().unwrap().body, b"ten");
    }

    #[test]
    fn test_installed_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path()).unwrap();
        assert!(storage.installed_at("v1").unwrap().is_none());

        let cache = storage.open("v1").unwrap();
        cache.put("http://site/a", &response("A")).unwrap();
        assert!(storage.installed_at("v1").unwrap().is_none());

        cache.mark_installed().unwrap();
        assert!(storage.installed_at("v1").unwrap().is_some());
        assert!(!dir.path().join("v2").exists());
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path()).unwrap();
        assert!(storage.open("../escape").is_err());
        assert!(storage.open("").is_err());
        assert!(!storage.has(".."));
    }
}
