//! Content-addressed raw payload cache
//!
//! One file per (provider, query, page):
//! `<cache_dir>/<provider>/<sha256(query)[..16]>-p<page>.json`.
//!
//! Keys from different adapters never collide, so concurrent adapters write
//! without coordination. Files are written via temp file + rename; a run
//! interrupted mid-write leaves no partial entry and completed pages are
//! reused by the next run.

use crate::error::ProviderError;
use crate::types::{ProviderId, RawProviderRecord};
use patfam_common::config::write_atomic;
use patfam_common::identifiers::normalize_text;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Raw payload cache rooted at a directory
#[derive(Debug, Clone)]
pub struct RawCache {
    root: PathBuf,
}

impl RawCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hash of the whitespace-normalized query
    pub fn query_hash(query: &str) -> String {
        let digest = Sha256::digest(normalize_text(query).as_bytes());
        format!("{:x}", digest)[..16].to_string()
    }

    /// Cache file for one page
    pub fn entry_path(&self, provider: ProviderId, query: &str, page: u32) -> PathBuf {
        self.root
            .join(provider.as_str())
            .join(format!("{}-p{}.json", Self::query_hash(query), page))
    }

    /// Look up a cached page.
    ///
    /// A missing file is a miss. An unreadable or corrupt file is also treated
    /// as a miss (and logged) so the page is refetched and overwritten.
    pub fn load(
        &self,
        provider: ProviderId,
        query: &str,
        page: u32,
    ) -> Option<RawProviderRecord> {
        let path = self.entry_path(provider, query, page);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(provider = %provider, page, path = %path.display(), error = %e, "Unreadable cache entry");
                return None;
            }
        };

        match serde_json::from_slice::<RawProviderRecord>(&content) {
            Ok(record) => {
                debug!(provider = %provider, page, path = %path.display(), "Raw cache hit");
                Some(record)
            }
            Err(e) => {
                warn!(provider = %provider, page, path = %path.display(), error = %e, "Corrupt cache entry ignored");
                None
            }
        }
    }

    /// Persist a fetched page
    pub fn store(&self, record: &RawProviderRecord) -> Result<PathBuf, ProviderError> {
        let path = self.entry_path(record.provider_id, &record.query, record.page);
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| ProviderError::Cache(format!("Encode {}: {}", path.display(), e)))?;
        write_atomic(&path, &bytes)
            .map_err(|e| ProviderError::Cache(format!("Write {}: {}", path.display(), e)))?;
        debug!(provider = %record.provider_id, page = record.page, path = %path.display(), "Raw page cached");
        Ok(path)
    }
}
