//! Error types for patfam-ingest
//!
//! Only configuration errors may abort a run. Provider and enrichment errors
//! are caught at the adapter boundary, counted, and reported in the
//! [`RunSummary`](crate::types::RunSummary).

use crate::types::ProviderId;
use thiserror::Error;

/// Provider adapter error
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or rejected credential; the provider is skipped for the run
    #[error("{provider}: authentication failed: {message}")]
    Authentication {
        provider: ProviderId,
        message: String,
    },

    /// Network failure, timeout, 5xx or 429; retried with backoff
    #[error("{provider}: transient fetch failure: {message}")]
    TransientFetch {
        provider: ProviderId,
        message: String,
    },

    /// Non-retryable provider response (e.g. 400, 404)
    #[error("{provider}: API error (status {status}): {message}")]
    Api {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    /// Unparseable payload or record
    #[error("{provider}: malformed record: {message}")]
    MalformedRecord {
        provider: ProviderId,
        message: String,
    },

    /// Raw cache read/write failure
    #[error("Raw cache error: {0}")]
    Cache(String),

    /// Run cancelled by the operator
    #[error("{0}: cancelled")]
    Cancelled(ProviderId),
}

impl ProviderError {
    /// Whether the retry helper should try again
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::TransientFetch { .. })
    }

    /// Classify a reqwest transport error
    pub fn from_reqwest(provider: ProviderId, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(provider, status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return ProviderError::MalformedRecord {
                provider,
                message: err.to_string(),
            };
        }
        // Connect, timeout, body and request errors are worth retrying
        ProviderError::TransientFetch {
            provider,
            message: err.to_string(),
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(provider: ProviderId, status: u16, message: String) -> Self {
        match status {
            401 | 403 => ProviderError::Authentication { provider, message },
            429 | 500..=599 | 408 => ProviderError::TransientFetch { provider, message },
            _ => ProviderError::Api {
                provider,
                status,
                message,
            },
        }
    }
}

/// Full-text enrichment error (never fatal)
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Source disabled or target unreachable
    #[error("Enrichment unavailable: {0}")]
    Unavailable(String),

    /// Source reachable but holds no text for the document
    #[error("No full text for {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}
