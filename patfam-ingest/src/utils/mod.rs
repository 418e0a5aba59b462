//! Utility modules for patfam-ingest

pub mod raw_cache;
pub mod retry;

pub use raw_cache::RawCache;
pub use retry::{retry_transient, RetryPolicy};
