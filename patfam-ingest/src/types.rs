//! Core data types for patent family ingestion
//!
//! Records flow one way: providers produce [`NormalizedPatentRecord`]s, the
//! resolver groups them into [`PatentFamily`]s, and the merge engine builds one
//! [`PatentFamilyRecord`] per family. Only the tagger and the enrichment step
//! touch a family record after that, and only through the additive methods
//! [`PatentFamilyRecord::add_tags`] and [`PatentFamilyRecord::add_snippet`].

use chrono::{DateTime, NaiveDate, Utc};
use patfam_common::identifiers::normalize_identifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Patent data provider
///
/// Closed set: three patent-office APIs and the curated JSONL supplement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// PatentsView-style JSON query API
    OfficeA,
    /// PATENTSCOPE-style search API (bearer token)
    OfficeB,
    /// OPS-style CQL search API (key/secret)
    OfficeC,
    /// Curated JSON Lines file
    Manual,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OfficeA,
        ProviderId::OfficeB,
        ProviderId::OfficeC,
        ProviderId::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OfficeA => "office_a",
            ProviderId::OfficeB => "office_b",
            ProviderId::OfficeC => "office_c",
            ProviderId::Manual => "manual",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown provider id: {}", s))
    }
}

/// Ordering used to break ties between providers (earlier = preferred)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPriority(Vec<ProviderId>);

impl ProviderPriority {
    /// Build from an ordered list; providers not listed rank after listed ones
    /// in their declaration order.
    pub fn new(order: &[ProviderId]) -> Self {
        let mut ranked: Vec<ProviderId> = Vec::with_capacity(ProviderId::ALL.len());
        for provider in order.iter().chain(ProviderId::ALL.iter()) {
            if !ranked.contains(provider) {
                ranked.push(*provider);
            }
        }
        Self(ranked)
    }

    /// Rank of a provider (0 = highest priority)
    pub fn rank(&self, provider: ProviderId) -> usize {
        self.0
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(self.0.len())
    }
}

impl Default for ProviderPriority {
    fn default() -> Self {
        Self::new(&ProviderId::ALL)
    }
}

/// Opaque payload returned by one provider for one page
///
/// Persisted as-is to the raw cache; never modified after fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProviderRecord {
    pub provider_id: ProviderId,
    pub fetched_at: DateTime<Utc>,
    /// Rendered query string/body the page was fetched with
    pub query: String,
    /// 0-based page index
    pub page: u32,
    pub payload: serde_json::Value,
}

/// Provider-agnostic patent record
///
/// Produced once per provider document and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPatentRecord {
    pub provider_id: ProviderId,
    /// Normalized document number including the jurisdiction prefix
    pub document_number: String,
    /// Provider-supplied family id, normalized
    pub family_id: Option<String>,
    pub jurisdiction: Option<String>,
    pub kind_code: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    pub claims: Vec<String>,
    pub classification_codes: Vec<String>,
    pub applicants: Vec<String>,
    pub inventors: Vec<String>,
    pub priority_numbers: Vec<String>,
    pub priority_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    pub legal_status: Option<String>,
    /// Completeness score (0.0-1.0), see [`completeness`]
    pub source_confidence: f64,
}

impl NormalizedPatentRecord {
    /// Empty record for a provider document; fill fields then call [`Self::finish`]
    pub fn new(provider_id: ProviderId, document_number: impl Into<String>) -> Self {
        Self {
            provider_id,
            document_number: document_number.into(),
            family_id: None,
            jurisdiction: None,
            kind_code: None,
            title: None,
            abstract_text: None,
            description: None,
            claims: Vec::new(),
            classification_codes: Vec::new(),
            applicants: Vec::new(),
            inventors: Vec::new(),
            priority_numbers: Vec::new(),
            priority_date: None,
            publication_date: None,
            filing_date: None,
            legal_status: None,
            source_confidence: 0.0,
        }
    }

    /// Trim text, drop empty values, normalize the family id, and compute
    /// `source_confidence`.
    pub fn finish(mut self) -> Self {
        self.family_id = self
            .family_id
            .map(|f| normalize_identifier(&f))
            .filter(|f| !f.is_empty());
        for field in [
            &mut self.jurisdiction,
            &mut self.kind_code,
            &mut self.title,
            &mut self.abstract_text,
            &mut self.description,
            &mut self.legal_status,
        ] {
            *field = clean_text(field.take());
        }
        self.jurisdiction = self.jurisdiction.map(|j| j.to_uppercase());
        self.kind_code = self.kind_code.map(|k| k.to_uppercase());

        for list in [
            &mut self.claims,
            &mut self.classification_codes,
            &mut self.applicants,
            &mut self.inventors,
            &mut self.priority_numbers,
        ] {
            list.retain(|v| !v.trim().is_empty());
            for value in list.iter_mut() {
                *value = value.trim().to_string();
            }
        }

        self.source_confidence = completeness(&[
            self.title.is_some(),
            self.abstract_text.is_some(),
            !self.claims.is_empty(),
            !self.classification_codes.is_empty(),
            !self.applicants.is_empty(),
            !self.inventors.is_empty(),
            self.priority_date.is_some(),
            self.publication_date.is_some(),
        ]);
        self
    }
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fraction of informational fields present
pub fn completeness(present: &[bool]) -> f64 {
    if present.is_empty() {
        return 0.0;
    }
    present.iter().filter(|p| **p).count() as f64 / present.len() as f64
}

/// Group of records the resolver considers one invention family
#[derive(Debug, Clone)]
pub struct PatentFamily {
    pub family_id: String,
    /// True when no provider supplied a family id
    pub synthesized: bool,
    /// Every provider family id seen in the group (normalized)
    pub family_aliases: BTreeSet<String>,
    pub document_numbers: BTreeSet<String>,
    pub records: Vec<NormalizedPatentRecord>,
}

/// One (provider, value) candidate that lost field resolution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConflictValue {
    pub provider_id: ProviderId,
    pub value: String,
}

/// Text passage attached to a family for retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub section: String,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
    /// SHA-256 of section + normalized text
    pub hash: String,
}

/// Canonical merged record, one per family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentFamilyRecord {
    pub family_id: String,
    #[serde(default)]
    pub synthesized_family_id: bool,
    #[serde(default)]
    pub family_aliases: BTreeSet<String>,
    pub document_numbers: BTreeSet<String>,
    pub jurisdiction: Option<String>,
    pub kind_code: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub classification_codes: Vec<String>,
    #[serde(default)]
    pub applicants: Vec<String>,
    #[serde(default)]
    pub inventors: Vec<String>,
    #[serde(default)]
    pub priority_numbers: Vec<String>,
    pub priority_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    pub legal_status: Option<String>,
    pub source_confidence: f64,
    pub contributing_providers: BTreeSet<ProviderId>,
    #[serde(default)]
    pub merge_conflicts: BTreeMap<String, Vec<ConflictValue>>,
    #[serde(default)]
    pub component_tags: BTreeSet<String>,
    #[serde(default)]
    pub snippets: Vec<Snippet>,
}

impl PatentFamilyRecord {
    /// Add component tags; returns how many were new. Never removes tags.
    pub fn add_tags<I>(&mut self, tags: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        tags.into_iter()
            .filter(|tag| self.component_tags.insert(tag.clone()))
            .count()
    }

    /// Append a snippet unless one with the same hash is present.
    pub fn add_snippet(&mut self, snippet: Snippet) -> bool {
        if self.snippets.iter().any(|s| s.hash == snippet.hash) {
            return false;
        }
        self.snippets.push(snippet);
        true
    }

    /// Total number of losing candidate values across fields
    pub fn conflict_count(&self) -> usize {
        self.merge_conflicts.values().map(Vec::len).sum()
    }
}

/// Outcome of one provider within a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub records: usize,
    pub pages_fetched: usize,
    pub pages_from_cache: usize,
    pub pages_skipped: usize,
    pub malformed_records: usize,
    /// Set when the provider was dropped for a credential problem
    pub authentication_failure: Option<String>,
    /// Set when the provider stopped on a non-auth error (e.g. cancellation)
    pub error: Option<String>,
}

impl ProviderOutcome {
    pub fn is_degraded(&self) -> bool {
        self.pages_skipped > 0
            || self.malformed_records > 0
            || self.authentication_failure.is_some()
            || self.error.is_some()
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub providers: BTreeMap<ProviderId, ProviderOutcome>,
    pub manual_skipped_lines: usize,
    pub record_count: usize,
    pub family_count: usize,
    pub synthesized_family_ids: usize,
    pub similarity_merges: usize,
    pub merge_conflicts: usize,
    pub tagged_families: usize,
    pub snippets_added: usize,
    pub enrichment_unavailable: usize,
    pub families_persisted: usize,
    /// Set when the family export could not be written
    pub persistence_error: Option<String>,
    /// True only when no skip/degradation counter is non-zero
    pub complete: bool,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            cancelled: false,
            providers: BTreeMap::new(),
            manual_skipped_lines: 0,
            record_count: 0,
            family_count: 0,
            synthesized_family_ids: 0,
            similarity_merges: 0,
            merge_conflicts: 0,
            tagged_families: 0,
            snippets_added: 0,
            enrichment_unavailable: 0,
            families_persisted: 0,
            persistence_error: None,
            complete: false,
        }
    }

    /// Stamp the finish time and compute `complete`
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.complete = !self.cancelled
            && self.manual_skipped_lines == 0
            && self.enrichment_unavailable == 0
            && self.persistence_error.is_none()
            && self.providers.values().all(|p| !p.is_degraded());
    }
}
