//! Network connectivity state shared by the data layer and the offline queue.
//!
//! The front end owns the truth about connectivity (an OS signal, a failed
//! health check, a user toggle) and reports it through `set_online`. Listeners wait
//! on `wait_online` to learn when connectivity is back.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Cloneable handle to the current online/offline state.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record a connectivity change. Waiters are woken on the offline -> online edge.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Resolve as soon as the client is online (immediately if it already is).
    pub async fn wait_online(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|online| *online).await;
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_online_updates_state() {
        let conn = Connectivity::new(false);
        assert!(!conn.is_online());
        conn.set_online(true);
        assert!(conn.is_online());
        assert!(conn.clone().is_online());
    }

    #[tokio::test]
    async fn test_wait_online_resolves_on_reconnect() {
        let conn = Connectivity::new(false);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.wait_online().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        conn.set_online(true);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_online_when_already_online() {
        Connectivity::new(true).wait_online().await;
    }
}
