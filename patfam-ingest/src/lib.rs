//! patfam-ingest library interface
//!
//! Cross-provider patent-family ingestion: provider adapters, family
//! resolution and merge, taxonomy tagging, full-text enrichment, family
//! export and canonical coverage reporting.

pub mod config;
pub mod enrichment;
pub mod error;
pub mod fusion;
pub mod providers;
pub mod store;
pub mod tagging;
pub mod types;
pub mod utils;
pub mod validators;
pub mod workflow;

pub use crate::config::IngestConfig;
pub use crate::error::{EnrichmentError, ProviderError};
pub use crate::workflow::{IngestPipeline, PipelineOutput};
