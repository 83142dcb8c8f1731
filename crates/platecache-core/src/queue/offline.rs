use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::connectivity::Connectivity;
use crate::data::{send_review, ReviewSubmission};
use crate::models::NewReview;

/// Replay task bookkeeping. `armed` stays true until the task has seen an
/// empty slot, so an enqueue racing a replay in flight is picked up by the
/// same task.
#[derive(Default)]
struct Listener {
    armed: bool,
    handle: Option<JoinHandle<()>>,
}

/// Single-slot queue for a review written while offline.
///
/// The slot is a JSON file, so a pending review survives restarts. A second
/// enqueue before replay overwrites the first.
pub struct OfflineWriteQueue {
    slot_path: PathBuf,
    api: ApiClient,
    connectivity: Connectivity,
    slot_lock: Mutex<()>,
    listener: Mutex<Listener>,
}

impl OfflineWriteQueue {
    /// Create a queue whose slot is `<dir>/<key>.json`.
    pub fn new(dir: &Path, key: &str, api: ApiClient, connectivity: Connectivity) -> Result<Arc<Self>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create offline queue directory {}", dir.display()))?;

        Ok(Arc::new(Self {
            slot_path: dir.join(format!("{}.json", key)),
            api,
            connectivity,
            slot_lock: Mutex::new(()),
            listener: Mutex::new(Listener::default()),
        }))
    }

    /// Store `review` as the pending write and make sure a replay listener is armed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(self: &Arc<Self>, review: &NewReview) -> Result<()> {
        {
            let _guard = self.lock_slot()?;
            let contents = serde_json::to_string(review)?;
            std::fs::write(&self.slot_path, contents).context("Failed to write offline review slot")?;
        }
        info!(restaurant_id = review.restaurant_id, "Review queued until connectivity returns");
        self.register_listener()
    }

    /// Arm the replay listener if a review from an earlier run is still pending.
    pub fn resume(self: &Arc<Self>) -> Result<()> {
        if self.pending()?.is_some() {
            debug!("Found pending review from a previous session");
            self.register_listener()?;
        }
        Ok(())
    }

    /// The review waiting in the slot, if any.
    pub fn pending(&self) -> Result<Option<NewReview>> {
        let _guard = self.lock_slot()?;
        self.read_slot()
    }

    /// Wait for an armed listener to finish its replay.
    pub async fn wait_idle(&self) {
        let handle = match self.listener.lock() {
            Ok(mut listener) => listener.handle.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Offline replay task failed");
            }
        }
    }

    fn register_listener(self: &Arc<Self>) -> Result<()> {
        let mut listener = self.lock_listener()?;
        if listener.armed {
            return Ok(());
        }

        let queue = Arc::clone(self);
        listener.armed = true;
        listener.handle = Some(tokio::spawn(async move {
            loop {
                queue.connectivity.wait_online().await;
                queue.replay().await;
                if queue.disarm_if_idle() {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Disarm the listener unless a review arrived while the last one was
    /// being sent. Checked under the listener lock so `register_listener`
    /// either sees the listener armed or arms a fresh one.
    fn disarm_if_idle(&self) -> bool {
        let mut listener = match self.lock_listener() {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "Offline replay listener stopped");
                return true;
            }
        };
        match self.pending() {
            Ok(Some(review)) => {
                debug!(restaurant_id = review.restaurant_id, "Review queued during replay, waiting again");
                false
            }
            Ok(None) => {
                listener.armed = false;
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to read offline review slot");
                listener.armed = false;
                true
            }
        }
    }

    fn lock_listener(&self) -> Result<std::sync::MutexGuard<'_, Listener>> {
        self.listener
            .lock()
            .map_err(|_| anyhow!("offline queue listener lock poisoned"))
    }

    /// Send the pending review. The slot is cleared before the send, so a
    /// failed send loses the review.
    async fn replay(&self) {
        let review = match self.take() {
            Ok(Some(review)) => review,
            Ok(None) => {
                debug!("Connectivity restored with no pending review");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read offline review slot");
                return;
            }
        };

        info!(restaurant_id = review.restaurant_id, "Replaying queued review");
        if let ReviewSubmission::Failed = send_review(&self.api, &review).await {
            warn!(restaurant_id = review.restaurant_id, "Queued review dropped after failed replay");
        }
    }

    fn take(&self) -> Result<Option<NewReview>> {
        let _guard = self.lock_slot()?;
        let review = self.read_slot()?;
        if review.is_some() {
            std::fs::remove_file(&self.slot_path).context("Failed to clear offline review slot")?;
        }
        Ok(review)
    }

    fn read_slot(&self) -> Result<Option<NewReview>> {
        if !self.slot_path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.slot_path).context("Failed to read offline review slot")?;
        let review = serde_json::from_str(&contents).context("Failed to parse offline review slot")?;
        Ok(Some(review))
    }

    fn lock_slot(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.slot_lock.lock().map_err(|_| anyhow!("offline queue slot lock poisoned"))
    }
}
