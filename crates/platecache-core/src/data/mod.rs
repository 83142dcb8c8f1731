//! Data access layer consumed by front ends.
//!
//! `DataAccessLayer` answers restaurant queries from the local store when it
//! is populated and from the backend otherwise, mirrors what it fetches, and
//! routes writes either to the backend or to the offline queue.

pub mod error;
pub mod query;
pub mod service;
mod submit;

pub use error::DataError;
pub use service::DataAccessLayer;
pub use submit::ReviewSubmission;

pub(crate) use submit::send_review;
