use thiserror::Error;

use super::WorkerState;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Invalid asset URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Fetching {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: WorkerState,
    },

    #[error("Asset cache storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
