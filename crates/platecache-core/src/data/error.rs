use thiserror::Error;

/// Message reported when an id matches no restaurant.
pub const RESTAURANT_NOT_FOUND: &str = "Restaurant does not exist";

#[derive(Error, Debug)]
pub enum DataError {
    /// Data is needed from the backend but the client is offline
    #[error("You are offline. Connect to the internet to load restaurants")]
    Offline,

    #[error("{0}")]
    NotFound(String),

    #[error("Remote call failed: {0:#}")]
    Remote(anyhow::Error),

    #[error("Local store error: {0:#}")]
    Store(anyhow::Error),
}

impl DataError {
    pub fn restaurant_not_found() -> Self {
        DataError::NotFound(RESTAURANT_NOT_FOUND.to_string())
    }
}
