//! Full-text enrichment
//!
//! Best-effort: for each document number of a family, the configured sources
//! are tried in order (local archive first, then scrape) and the first one
//! returning text wins for that document. Text is chunked into snippets and
//! appended unless a snippet with the same hash is already present, so
//! re-running enrichment never duplicates anything.
//!
//! No failure here propagates past [`Enricher::enrich`]; a family for which no
//! source produced text is counted as unavailable and left as it was.

pub mod local_archive;
pub mod scrape;
pub mod snippets;

pub use local_archive::LocalArchiveSource;
pub use scrape::ScrapeSource;

use crate::config::EnrichmentConfig;
use crate::error::EnrichmentError;
use crate::types::PatentFamilyRecord;
use async_trait::async_trait;
use snippets::{section_snippets, CLAIMS_SECTION, DESCRIPTION_SECTION};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extended text for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullText {
    pub claims: Option<String>,
    pub description: Option<String>,
}

impl FullText {
    pub fn is_empty(&self) -> bool {
        self.claims.as_deref().map_or(true, |c| c.trim().is_empty())
            && self.description.as_deref().map_or(true, |d| d.trim().is_empty())
    }
}

/// One place extended text can come from
#[async_trait]
pub trait FullTextSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, document_number: &str) -> Result<FullText, EnrichmentError>;
}

/// Result of enriching one family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    pub snippets_added: usize,
    /// No source produced text for any document of the family
    pub unavailable: bool,
}

pub struct Enricher {
    sources: Vec<Arc<dyn FullTextSource>>,
}

impl Enricher {
    pub fn new(sources: Vec<Arc<dyn FullTextSource>>) -> Self {
        Self { sources }
    }

    /// Sources enabled by configuration; `None` when enrichment is off
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>, EnrichmentError> {
        if !config.enabled {
            return Ok(None);
        }
        let mut sources: Vec<Arc<dyn FullTextSource>> = Vec::new();
        if let Some(dir) = &config.local_dir {
            sources.push(Arc::new(LocalArchiveSource::new(dir)));
        }
        if config.scrape {
            sources.push(Arc::new(ScrapeSource::new(
                &config.scrape_base_url,
                std::time::Duration::from_secs(config.timeout_secs),
            )?));
        }
        if sources.is_empty() {
            warn!("Enrichment enabled but no source configured");
        }
        Ok(Some(Self::new(sources)))
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn enrich(&self, record: &mut PatentFamilyRecord) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome::default();
        let mut any_text = false;
        let document_numbers: Vec<String> = record.document_numbers.iter().cloned().collect();

        for document_number in &document_numbers {
            let Some(text) = self.fetch_first(document_number).await else {
                continue;
            };
            any_text = true;

            let mut snippets = Vec::new();
            if let Some(claims) = &text.claims {
                snippets.extend(section_snippets(CLAIMS_SECTION, claims));
            }
            if let Some(description) = &text.description {
                snippets.extend(section_snippets(DESCRIPTION_SECTION, description));
            }
            for snippet in snippets {
                if record.add_snippet(snippet) {
                    outcome.snippets_added += 1;
                }
            }
        }

        if !any_text {
            outcome.unavailable = true;
            warn!(
                family_id = %record.family_id,
                sources = ?self.source_names(),
                "Full text unavailable"
            );
        } else {
            debug!(
                family_id = %record.family_id,
                snippets_added = outcome.snippets_added,
                "Family enriched"
            );
        }
        outcome
    }

    async fn fetch_first(&self, document_number: &str) -> Option<FullText> {
        for source in &self.sources {
            match source.fetch(document_number).await {
                Ok(text) if !text.is_empty() => return Some(text),
                Ok(_) => debug!(source = source.name(), document_number, "Source returned empty text"),
                Err(err) => debug!(source = source.name(), document_number, error = %err, "Source failed"),
            }
        }
        None
    }

    /// Enrich every family; returns (snippets added, families unavailable)
    pub async fn enrich_all(&self, records: &mut [PatentFamilyRecord]) -> (usize, usize) {
        let mut added = 0;
        let mut unavailable = 0;
        for record in records.iter_mut() {
            let outcome = self.enrich(record).await;
            added += outcome.snippets_added;
            if outcome.unavailable {
                unavailable += 1;
            }
        }
        info!(snippets_added = added, unavailable, "Enrichment pass complete");
        (added, unavailable)
    }
}
