//! Durable holding area for writes made while offline.
//!
//! Only reviews are queued, and only one at a time: the slot keeps the most
//! recent submission and is replayed once connectivity returns.

pub mod offline;

pub use offline::OfflineWriteQueue;
