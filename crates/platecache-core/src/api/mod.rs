//! REST API client module for the restaurant backend.
//!
//! This module provides the `ApiClient` for fetching restaurants and
//! reviews, toggling favorites and posting new reviews. The backend needs
//! no authentication.

pub mod client;
pub mod error;

pub use client::{ApiClient, SubmitOutcome};
pub use error::ApiError;
