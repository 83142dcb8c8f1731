//! Install, activation and request handling for the asset cache.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use futures::future::try_join_all;
use reqwest::{header, Client, Url};
use tracing::{debug, info, warn};

use crate::config::Config;

use super::manifest::{self, parse_origin};
use super::storage::{CacheStorage, CachedResponse};
use super::AssetError;

/// Lifecycle of the asset cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// A response handed back to the caller of [`AssetCacheManager::fetch`].
#[derive(Debug, Clone)]
pub struct AssetResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl AssetResponse {
    fn from_cached(url: String, cached: CachedResponse, source: ResponseSource) -> Self {
        Self {
            url,
            status: cached.status,
            content_type: cached.content_type,
            body: cached.body,
            source,
        }
    }
}

pub struct AssetCacheManager {
    client: Client,
    storage: CacheStorage,
    generation: String,
    origin: Url,
    manifest: Vec<String>,
    state: Mutex<WorkerState>,
}

impl AssetCacheManager {
    /// The initial state is read from disk. An installed current generation
    /// is `Active` when it is the only one and `Installed` next to older ones.
    /// An uninstalled current generation is `Active` while an older installed
    /// generation still serves requests, `Uninstalled` otherwise.
    pub fn new(storage: CacheStorage, generation: &str, origin: &str, manifest: Vec<String>) -> Result<Self> {
        let origin = parse_origin(origin)?;
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let mut manager = Self {
            client,
            storage,
            generation: generation.to_string(),
            origin,
            manifest,
            state: Mutex::new(WorkerState::Uninstalled),
        };

        let names = manager.storage.keys()?;
        let state = if manager.storage.installed_at(generation)?.is_some() {
            if names.len() == 1 {
                WorkerState::Active
            } else {
                WorkerState::Installed
            }
        } else if manager.live_generation()?.is_some() {
            WorkerState::Active
        } else {
            WorkerState::Uninstalled
        };
        debug!(generation, ?state, "Asset cache opened");

        *manager.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
        Ok(manager)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = CacheStorage::new(&config.asset_cache_dir()?)?;
        Self::new(
            storage,
            &config.cache_generation,
            &config.site_origin,
            config.asset_manifest.clone(),
        )
    }

    pub fn state(&self) -> WorkerState {
        *self.lock_state()
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Names of every generation on disk.
    pub fn cache_names(&self) -> Result<Vec<String>, AssetError> {
        Ok(self.storage.keys()?)
    }

    /// The generation that takes new entries: the current one once installed,
    /// otherwise the most recently installed other generation.
    fn live_generation(&self) -> Result<Option<String>> {
        if self.storage.installed_at(&self.generation)?.is_some() {
            return Ok(Some(self.generation.clone()));
        }
        let mut live = None;
        for name in self.storage.keys()? {
            if let Some(at) = self.storage.installed_at(&name)? {
                if live.as_ref().map_or(true, |(latest, _)| at > *latest) {
                    live = Some((at, name));
                }
            }
        }
        Ok(live.map(|(_, name)| name))
    }

    /// URLs stored in the current generation.
    pub fn cached_urls(&self) -> Result<Vec<String>, AssetError> {
        if !self.storage.has(&self.generation) {
            return Ok(Vec::new());
        }
        Ok(self.storage.open(&self.generation)?.keys()?)
    }

    /// Fetch every manifest entry into the current generation.
    ///
    /// Nothing is written unless every fetch succeeds; on failure the state
    /// and generations are left as they were. Returns the number of entries
    /// stored.
    pub async fn install(&self) -> Result<usize, AssetError> {
        let previous = self.transition("install", WorkerState::Installing, |s| {
            !matches!(s, WorkerState::Installing | WorkerState::Activating)
        })?;

        match self.populate().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed);
                info!(generation = %self.generation, count, "Asset cache installed");
                Ok(count)
            }
            Err(e) => {
                self.set_state(previous);
                warn!(generation = %self.generation, error = %e, "Asset cache install failed");
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize, AssetError> {
        let urls = self
            .manifest
            .iter()
            .map(|entry| manifest::resolve(&self.origin, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(urls.iter().map(|url| async move {
            let response = self.fetch_network(url).await?;
            if !response.is_success() {
                return Err(AssetError::Status {
                    url: url.to_string(),
                    status: response.status,
                });
            }
            Ok::<_, AssetError>(response)
        }))
        .await?;

        let existed = self.storage.has(&self.generation);
        let written = self.storage.open(&self.generation).and_then(|cache| {
            cache.put_all(urls.iter().map(Url::as_str).zip(responses.iter()))?;
            cache.mark_installed()
        });
        if let Err(e) = written {
            if !existed {
                let _ = self.storage.delete(&self.generation);
            }
            return Err(e.into());
        }
        Ok(responses.len())
    }

    /// Delete every generation other than the current one.
    /// Returns the deleted names.
    pub async fn activate(&self) -> Result<Vec<String>, AssetError> {
        if self.storage.installed_at(&self.generation)?.is_none() {
            return Err(AssetError::InvalidState {
                operation: "activate",
                state: self.state(),
            });
        }
        let previous = self.transition("activate", WorkerState::Activating, |s| {
            matches!(s, WorkerState::Installed | WorkerState::Active)
        })?;

        match self.prune() {
            Ok(deleted) => {
                self.set_state(WorkerState::Active);
                info!(generation = %self.generation, deleted = ?deleted, "Asset cache activated");
                Ok(deleted)
            }
            Err(e) => {
                self.set_state(previous);
                warn!(generation = %self.generation, error = %e, "Asset cache activation failed");
                Err(e)
            }
        }
    }

    fn prune(&self) -> Result<Vec<String>, AssetError> {
        let mut deleted = Vec::new();
        for name in self.storage.keys()? {
            if name != self.generation && self.storage.delete(&name)? {
                debug!(generation = %name, "Deleted stale asset cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Answer a request from the cache, or from the network on a miss.
    ///
    /// The current generation is searched first. Successful network
    /// responses are copied into the live generation; with nothing installed
    /// they are returned uncached. A network failure on a miss is returned as
    /// an error.
    pub async fn fetch(&self, request: &str) -> Result<AssetResponse, AssetError> {
        let url = manifest::resolve(&self.origin, request)?;

        if let Some(cached) = self.storage.match_url(url.as_str(), &self.generation)? {
            debug!(url = %url, "Asset served from cache");
            return Ok(AssetResponse::from_cached(url.into(), cached, ResponseSource::Cache));
        }

        let response = self.fetch_network(&url).await?;
        if !response.is_success() {
            debug!(url = %url, status = response.status, "Not caching unsuccessful response");
        } else if let Some(live) = self.live_generation()? {
            self.storage.open(&live)?.put(url.as_str(), &response)?;
        } else {
            debug!(url = %url, "No installed generation, response not cached");
        }
        Ok(AssetResponse::from_cached(url.into(), response, ResponseSource::Network))
    }

    async fn fetch_network(&self, url: &Url) -> Result<CachedResponse, AssetError> {
        let network = |source: reqwest::Error| AssetError::Network {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url.clone()).send().await.map_err(network)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(network)?;

        Ok(CachedResponse::new(status, content_type, body.to_vec()))
    }

    /// Move to `next` if `allowed` accepts the current state; returns the state left.
    fn transition(
        &self,
        operation: &'static str,
        next: WorkerState,
        allowed: impl Fn(WorkerState) -> bool,
    ) -> Result<WorkerState, AssetError> {
        let mut state = self.lock_state();
        let current = *state;
        if !allowed(current) {
            return Err(AssetError::InvalidState {
                operation,
                state: current,
            });
        }
        *state = next;
        Ok(current)
    }

    fn set_state(&self, next: WorkerState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(dir: &tempfile::TempDir, generation: &str, origin: &str, manifest: &[&str]) -> AssetCacheManager {
        let storage = CacheStorage::new(dir.path()).unwrap();
        let manifest = manifest.iter().map(|s| s.to_string()).collect();
        AssetCacheManager::new(storage, generation, origin, manifest).unwrap()
    }

    /// Lay down a fully installed generation holding `paths` under `origin`.
    fn seed_installed(dir: &tempfile::TempDir, name: &str, origin: &str, paths: &[&str]) {
        let origin = parse_origin(origin).unwrap();
        let cache = CacheStorage::new(dir.path()).unwrap().open(name).unwrap();
        for p in paths {
            let url = manifest::resolve(&origin, p).unwrap();
            let body = format!("{} from {}", p, name).into_bytes();
            cache.put(url.as_str(), &CachedResponse::new(200, None, body)).unwrap();
        }
        cache.mark_installed().unwrap();
    }

    async fn mount_ok(server: &MockServer, route: &str, body: &str, calls: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html"))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_install_stores_every_manifest_entry() {
        let server = MockServer::start().await;
        mount_ok(&server, "/", "root", 1).await;
        mount_ok(&server, "/index.html", "index", 1).await;
        let dir = tempfile::tempdir().unwrap();
        let assets = manager(&dir, "v1", &server.uri(), &["/", "/index.html"]);
        assert_eq!(assets.state(), WorkerState::Uninstalled);

        assert_eq!(assets.install().await.unwrap(), 2);
        assert_eq!(assets.state(), WorkerState::Installed);
        assert_eq!(assets.cache_names().unwrap(), vec!["v1"]);
        assert_eq!(assets.cached_urls().unwrap().len(), 2);

        let reopened = manager(&dir, "v1", &server.uri(), &["/", "/index.html"]);
        assert_eq!(reopened.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_failed_entry_aborts_install() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("index"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.css"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assets = manager(&dir, "v1", &server.uri(), &["/index.html", "/missing.css"]);

        let err = assets.install().await.unwrap_err();
        assert!(matches!(err, AssetError::Status { status: 404, .. }));
        assert_eq!(assets.state(), WorkerState::Uninstalled);
        assert!(assets.cache_names().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation_serving() {
        let server = MockServer::start().await;
        mount_ok(&server, "/css/styles.css", "fresh", 0).await;
        Mock::given(method("GET"))
            .and(path("/missing.css"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        seed_installed(&dir, "v4", &server.uri(), &["/css/styles.css"]);

        let assets = manager(&dir, "v5", &server.uri(), &["/missing.css"]);
        assert_eq!(assets.state(), WorkerState::Active);

        assert!(assets.install().await.is_err());
        assert_eq!(assets.cache_names().unwrap(), vec!["v4"]);
        assert_eq!(assets.state(), WorkerState::Active);

        let response = assets.fetch("/css/styles.css").await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"/css/styles.css from v4");
    }

    #[tokio::test]
    async fn test_activate_deletes_other_generations() {
        let dir = tempfile::tempdir().unwrap();
        seed_installed(&dir, "v4", "http://localhost:8000", &["/"]);
        seed_installed(&dir, "v7", "http://localhost:8000", &["/"]);

        let assets = manager(&dir, "v7", "http://localhost:8000", &[]);
        assert_eq!(assets.state(), WorkerState::Installed);

        assert_eq!(assets.activate().await.unwrap(), vec!["v4"]);
        assert_eq!(assets.cache_names().unwrap(), vec!["v7"]);
        assert_eq!(assets.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let dir = tempfile::tempdir().unwrap();
        let assets = manager(&dir, "v1", "http://localhost:8000", &[]);
        let err = assets.activate().await.unwrap_err();
        assert!(matches!(
            err,
            AssetError::InvalidState {
                operation: "activate",
                state: WorkerState::Uninstalled
            }
        ));
    }

    #[tokio::test]
    async fn test_miss_before_install_goes_to_live_generation() {
        let server = MockServer::start().await;
        mount_ok(&server, "/x.css", "x", 1).await;
        let dir = tempfile::tempdir().unwrap();
        seed_installed(&dir, "v7", &server.uri(), &["/index.html"]);

        let assets = manager(&dir, "v8", &server.uri(), &["/index.html"]);
        assert_eq!(assets.fetch("/x.css").await.unwrap().source, ResponseSource::Network);
        assert_eq!(assets.cache_names().unwrap(), vec!["v7"]);
        assert!(assets.cached_urls().unwrap().is_empty());

        // A restart must not mistake the uninstalled generation for a ready one
        let reopened = manager(&dir, "v8", &server.uri(), &["/index.html"]);
        assert_eq!(reopened.state(), WorkerState::Active);
        assert!(matches!(
            reopened.activate().await,
            Err(AssetError::InvalidState { operation: "activate", .. })
        ));
        assert_eq!(reopened.cache_names().unwrap(), vec!["v7"]);
        assert_eq!(reopened.fetch("/x.css").await.unwrap().source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_miss_with_nothing_installed_is_not_cached() {
        let server = MockServer::start().await;
        mount_ok(&server, "/x.css", "x", 2).await;
        let dir = tempfile::tempdir().unwrap();
        let assets = manager(&dir, "v1", &server.uri(), &[]);

        assert_eq!(assets.fetch("/x.css").await.unwrap().source, ResponseSource::Network);
        assert_eq!(assets.fetch("/x.css").await.unwrap().source, ResponseSource::Network);
        assert!(assets.cache_names().unwrap().is_empty());
        assert_eq!(assets.state(), WorkerState::Uninstalled);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let server = MockServer::start().await;
        mount_ok(&server, "/index.html", "fresh", 0).await;
        let dir = tempfile::tempdir().unwrap();
        seed_installed(&dir, "v1", &server.uri(), &["/index.html"]);
        let assets = manager(&dir, "v1", &server.uri(), &["/index.html"]);

        let response = assets.fetch("/index.html").await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"/index.html from v1");
    }

    #[tokio::test]
    async fn test_current_generation_answers_before_older_names() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        seed_installed(&dir, "v10", &server.uri(), &["/index.html"]);
        seed_installed(&dir, "v4", &server.uri(), &["/index.html"]);
        let assets = manager(&dir, "v4", &server.uri(), &["/index.html"]);

        assert_eq!(assets.fetch("/index.html").await.unwrap().body, b"/index.html from v4");
    }

    #[tokio::test]
    async fn test_cache_miss_is_stored_for_next_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpeg".to_vec(), "image/jpeg"))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assets = manager(&dir, "v1", &server.uri(), &[]);
        assert_eq!(assets.install().await.unwrap(), 0);

        let first = assets.fetch("/img/1.jpg").await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.content_type.as_deref(), Some("image/jpeg"));

        let second = assets.fetch("/img/1.jpg").await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body, b"jpeg");
        assert_eq!(second.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_unsuccessful_miss_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nope"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assets = manager(&dir, "v1", &server.uri(), &[]);
        assets.install().await.unwrap();

        assert_eq!(assets.fetch("/nope").await.unwrap().status, 404);
        assert_eq!(assets.fetch("/nope").await.unwrap().source, ResponseSource::Network);
    }
}
