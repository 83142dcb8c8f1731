//! The `DataAccessLayer` service.
//!
//! One instance is built at startup with its collaborators injected and then
//! shared by reference. Every operation completes asynchronously and reports
//! through its return value; nothing here panics on a failed fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::models::{NewReview, Restaurant, Review};
use crate::queue::OfflineWriteQueue;
use crate::store::{Collection, PersistentStore, StoreRecord};

use super::submit::{send_review, ReviewSubmission};
use super::{query, DataError};

pub struct DataAccessLayer {
    api: ApiClient,
    store: Arc<PersistentStore>,
    connectivity: Connectivity,
    queue: Arc<OfflineWriteQueue>,
    // Store writes that run after a result has been returned
    background: Mutex<JoinSet<()>>,
    write_failures: Arc<AtomicU64>,
}

impl DataAccessLayer {
    pub fn new(
        api: ApiClient,
        store: Arc<PersistentStore>,
        connectivity: Connectivity,
        queue: Arc<OfflineWriteQueue>,
    ) -> Self {
        Self {
            api,
            store,
            connectivity,
            queue,
            background: Mutex::new(JoinSet::new()),
            write_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build the layer and its collaborators from configuration.
    ///
    /// Re-arms replay of a review left pending by an earlier run, so this
    /// must be called from within a tokio runtime.
    pub fn from_config(config: &Config, connectivity: Connectivity) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url)?;
        let store = PersistentStore::open(config.store_root().as_deref(), &config.database_name);
        let queue = OfflineWriteQueue::new(
            &config.offline_dir()?,
            &config.offline_slot_key,
            api.clone(),
            connectivity.clone(),
        )?;
        queue.resume()?;

        Ok(Self::new(api, Arc::new(store), connectivity, queue))
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn queue(&self) -> &Arc<OfflineWriteQueue> {
        &self.queue
    }

    // =========================================================================
    // Restaurant queries
    // =========================================================================

    /// All restaurants, from the local store once it has been populated.
    ///
    /// With an empty store the list is fetched from the backend, returned,
    /// and written to the store in the background. A populated store is never
    /// refreshed from the backend.
    pub async fn fetch_all_restaurants(&self) -> Result<Vec<Restaurant>, DataError> {
        let count = self
            .store
            .count(Collection::Restaurants)
            .map_err(DataError::Store)?;

        if count > 0 {
            debug!(count, "Serving restaurants from local store");
            return self.store.get_all().map_err(DataError::Store);
        }

        if !self.connectivity.is_online() {
            warn!("Offline with an empty local store, cannot load restaurants");
            return Err(DataError::Offline);
        }

        let restaurants = self.api.fetch_restaurants().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch restaurants");
            DataError::Remote(e)
        })?;
        info!(count = restaurants.len(), "Fetched restaurants from backend");

        self.mirror(restaurants.clone());
        Ok(restaurants)
    }

    pub async fn fetch_restaurant_by_id(&self, id: i64) -> Result<Restaurant, DataError> {
        let restaurants = self.fetch_all_restaurants().await?;
        query::by_id(restaurants, id).ok_or_else(DataError::restaurant_not_found)
    }

    pub async fn fetch_by_cuisine(&self, cuisine: &str) -> Result<Vec<Restaurant>, DataError> {
        Ok(query::by_cuisine(self.fetch_all_restaurants().await?, cuisine))
    }

    pub async fn fetch_by_neighborhood(&self, neighborhood: &str) -> Result<Vec<Restaurant>, DataError> {
        Ok(query::by_neighborhood(self.fetch_all_restaurants().await?, neighborhood))
    }

    /// Filter on both fields; pass `"all"` to leave a field unfiltered.
    pub async fn fetch_by_cuisine_and_neighborhood(
        &self,
        cuisine: &str,
        neighborhood: &str,
    ) -> Result<Vec<Restaurant>, DataError> {
        let restaurants = self.fetch_all_restaurants().await?;
        Ok(query::by_cuisine_and_neighborhood(restaurants, cuisine, neighborhood))
    }

    pub async fn fetch_neighborhoods(&self) -> Result<Vec<String>, DataError> {
        Ok(query::neighborhoods(&self.fetch_all_restaurants().await?))
    }

    pub async fn fetch_cuisines(&self) -> Result<Vec<String>, DataError> {
        Ok(query::cuisines(&self.fetch_all_restaurants().await?))
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    /// Reviews for one restaurant, always from the backend, mirrored locally afterwards.
    pub async fn fetch_reviews_for_restaurant(&self, restaurant_id: i64) -> Result<Vec<Review>, DataError> {
        let reviews = self.api.fetch_reviews(restaurant_id).await.map_err(|e| {
            warn!(restaurant_id, error = %e, "Failed to fetch reviews");
            DataError::Remote(e)
        })?;
        debug!(restaurant_id, count = reviews.len(), "Fetched reviews");

        self.mirror(reviews.clone());
        Ok(reviews)
    }

    /// Send a review now, or park it in the offline queue when disconnected.
    pub async fn submit_review(&self, review: NewReview) -> ReviewSubmission {
        if !self.connectivity.is_online() {
            return match self.queue.enqueue(&review) {
                Ok(()) => ReviewSubmission::Queued,
                Err(e) => {
                    warn!(restaurant_id = review.restaurant_id, error = %e, "Failed to queue offline review");
                    ReviewSubmission::Failed
                }
            };
        }
        send_review(&self.api, &review).await
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    /// Update the favorite flag on the server, then in the local store.
    ///
    /// The local record is only touched after the server accepted the change.
    pub async fn update_favorite_status(&self, restaurant_id: i64, is_favorite: bool) -> Result<(), DataError> {
        self.api
            .update_favorite(restaurant_id, is_favorite)
            .await
            .map_err(|e| {
                warn!(restaurant_id, error = %e, "Failed to update favorite on server");
                DataError::Remote(e)
            })?;
        info!(restaurant_id, is_favorite, "Favorite updated on server");

        match self.store.get::<Restaurant>(restaurant_id).map_err(DataError::Store)? {
            Some(mut restaurant) => {
                restaurant.set_favorite(is_favorite);
                self.store.put(&restaurant).map_err(DataError::Store)?;
            }
            None => debug!(restaurant_id, "Restaurant not in local store, skipping local update"),
        }
        Ok(())
    }

    // =========================================================================
    // Background writes
    // =========================================================================

    /// Wait for every background store write started so far.
    pub async fn flush_background(&self) {
        let mut pending = match self.background.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(_) => return,
        };
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background store task failed");
            }
        }
    }

    /// Number of records that failed to reach the local store in the background.
    pub fn background_write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Write `records` to the store without making the caller wait.
    fn mirror<T>(&self, records: Vec<T>)
    where
        T: StoreRecord + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let failures = Arc::clone(&self.write_failures);

        let task = async move {
            let total = records.len();
            let mut written = 0;
            for record in &records {
                match store.put(record) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            collection = %T::COLLECTION,
                            id = record.key(),
                            error = %e,
                            "Background store write failed"
                        );
                    }
                }
            }
            debug!(collection = %T::COLLECTION, written, total, "Mirrored records into local store");
        };

        match self.background.lock() {
            Ok(mut set) => {
                set.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }
}
