//! Manual/curated supplement adapter
//!
//! Reads line-delimited JSON, one patent object per line, using the same
//! field names as [`NormalizedPatentRecord`]. A line that is not valid JSON or
//! lacks a document number is skipped and counted; blank lines and lines
//! starting with `#` are ignored.

use super::payload::{require_document_number, ClaimsField, IdValue, ProviderPayload};
use super::ProviderRun;
use crate::error::ProviderError;
use crate::types::{NormalizedPatentRecord, ProviderId, ProviderOutcome};
use patfam_common::time::parse_date;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One curated line
#[derive(Debug, Clone, Deserialize)]
pub struct ManualRecord {
    #[serde(alias = "doc_number", alias = "publication_number")]
    pub document_number: Option<IdValue>,
    pub family_id: Option<IdValue>,
    pub jurisdiction: Option<String>,
    pub kind_code: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    pub claims: Option<ClaimsField>,
    #[serde(alias = "cpc_codes")]
    pub classification_codes: Option<Vec<String>>,
    pub ipc_codes: Option<Vec<String>>,
    #[serde(alias = "assignees")]
    pub applicants: Option<Vec<String>>,
    pub inventors: Option<Vec<String>>,
    pub priority_numbers: Option<Vec<String>>,
    pub priority_date: Option<String>,
    pub publication_date: Option<String>,
    pub filing_date: Option<String>,
    pub legal_status: Option<String>,
}

impl ManualRecord {
    pub fn normalize(self) -> Result<NormalizedPatentRecord, ProviderError> {
        let raw_number = self.document_number.map(IdValue::into_string);
        let jurisdiction = self
            .jurisdiction
            .clone()
            .or_else(|| {
                raw_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| n.chars().take(2).all(|c| c.is_ascii_alphabetic()) && n.len() > 2)
                    .map(|n| n[..2].to_string())
            })
            .unwrap_or_default();
        let document_number =
            require_document_number(ProviderId::Manual, raw_number.as_deref(), &jurisdiction)?;

        let mut record = NormalizedPatentRecord::new(ProviderId::Manual, document_number);
        record.jurisdiction = Some(jurisdiction);
        record.family_id = self.family_id.map(IdValue::into_string);
        record.kind_code = self.kind_code;
        record.title = self.title;
        record.abstract_text = self.abstract_text;
        record.description = self.description;
        record.claims = self.claims.map(ClaimsField::into_claims).unwrap_or_default();

        let mut codes = self.classification_codes.unwrap_or_default();
        codes.extend(self.ipc_codes.unwrap_or_default());
        record.classification_codes = codes;
        record.applicants = self.applicants.unwrap_or_default();
        record.inventors = self.inventors.unwrap_or_default();
        record.priority_numbers = self.priority_numbers.unwrap_or_default();

        record.filing_date = self.filing_date.as_deref().and_then(parse_date);
        record.publication_date = self.publication_date.as_deref().and_then(parse_date);
        record.priority_date = self
            .priority_date
            .as_deref()
            .and_then(parse_date)
            .or(record.filing_date);
        record.legal_status = self.legal_status;

        Ok(record.finish())
    }
}

/// Result of reading a curated file
#[derive(Debug, Default)]
pub struct ManualLoad {
    pub records: Vec<NormalizedPatentRecord>,
    pub skipped_lines: usize,
}

/// Parse JSONL content; malformed lines are counted, never fatal
pub fn parse_lines(content: &str) -> ManualLoad {
    let mut load = ManualLoad::default();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed = serde_json::from_str::<serde_json::Value>(line)
            .map_err(|e| ProviderError::MalformedRecord {
                provider: ProviderId::Manual,
                message: e.to_string(),
            })
            .and_then(|value| ProviderPayload::decode(ProviderId::Manual, value))
            .and_then(ProviderPayload::normalize);

        match parsed {
            Ok(record) => load.records.push(record),
            Err(err) => {
                load.skipped_lines += 1;
                warn!(
                    provider = %ProviderId::Manual,
                    line = index + 1,
                    skipped_lines = load.skipped_lines,
                    error = %err,
                    "Malformed curated line skipped"
                );
            }
        }
    }

    load
}

/// Curated JSONL adapter
pub struct ManualAdapter {
    path: PathBuf,
}

impl ManualAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole file
    pub async fn load(&self) -> Result<ManualLoad, ProviderError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProviderError::MalformedRecord {
                provider: ProviderId::Manual,
                message: format!("cannot read {}: {}", self.path.display(), e),
            }
        })?;
        Ok(parse_lines(&content))
    }

    /// Load into the same shape as an office provider run
    pub async fn collect(&self) -> ProviderRun {
        let mut outcome = ProviderOutcome::default();
        let records = match self.load().await {
            Ok(load) => {
                outcome.malformed_records = load.skipped_lines;
                load.records
            }
            Err(err) => {
                warn!(provider = %ProviderId::Manual, error = %err, "Curated file unavailable");
                outcome.error = Some(err.to_string());
                Vec::new()
            }
        };
        outcome.records = records.len();
        info!(
            provider = %ProviderId::Manual,
            path = %self.path.display(),
            records = outcome.records,
            skipped_lines = outcome.malformed_records,
            "Curated file loaded"
        );

        ProviderRun {
            provider: ProviderId::Manual,
            records,
            outcome,
        }
    }
}
