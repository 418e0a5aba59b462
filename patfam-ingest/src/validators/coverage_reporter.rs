//! Coverage Reporter
//!
//! Read-side pass comparing assembled families against a canonical
//! "must-have" list. Identifiers are matched with the same normalization the
//! family resolver uses, so a bare document number finds the family holding
//! that document whichever provider supplied it, and a trailing kind code is
//! optional on either side.
//!
//! # Canonical list formats
//! - Text: one identifier per line, optional `| label | notes` columns,
//!   `#` comments and blank lines ignored
//! - JSON array of strings
//! - JSON array of objects with `doc_number` / `publication_number` /
//!   `family_id`, plus optional `label` and `notes`
//! - JSON object whose values are identifiers

use crate::types::{PatentFamilyRecord, ProviderId};
use chrono::{DateTime, Utc};
use patfam_common::config::write_atomic;
use patfam_common::identifiers::{match_keys, normalize_identifier};
use patfam_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// One external must-have identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalReferenceEntry {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CanonicalReferenceEntry {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: None,
            notes: None,
        }
    }
}

/// A canonical entry matched to an assembled family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundEntry {
    #[serde(flatten)]
    pub entry: CanonicalReferenceEntry,
    pub family_id: String,
    pub contributing_providers: BTreeSet<ProviderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub generated_at: DateTime<Utc>,
    pub canonical_count: usize,
    pub found_count: usize,
    pub coverage_ratio: f64,
    pub found: Vec<FoundEntry>,
    pub missing: Vec<CanonicalReferenceEntry>,
    /// Family id → providers that contributed to it, for every found family
    pub provider_coverage_matrix: BTreeMap<String, BTreeSet<ProviderId>>,
}

impl CoverageReport {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)?;
        info!(path = %path.display(), "Coverage report written");
        Ok(())
    }
}

/// Identifier index over a set of families
pub struct CoverageReporter<'a> {
    families: Vec<&'a PatentFamilyRecord>,
    index: HashMap<String, usize>,
}

impl<'a> CoverageReporter<'a> {
    pub fn new<I>(families: I) -> Self
    where
        I: IntoIterator<Item = &'a PatentFamilyRecord>,
    {
        let mut families: Vec<&PatentFamilyRecord> = families.into_iter().collect();
        families.sort_by(|a, b| a.family_id.cmp(&b.family_id));

        let mut index = HashMap::new();
        for (idx, family) in families.iter().enumerate() {
            let identifiers = std::iter::once(&family.family_id)
                .chain(family.family_aliases.iter())
                .chain(family.document_numbers.iter());
            for identifier in identifiers {
                for key in match_keys(identifier) {
                    index.entry(key).or_insert(idx);
                }
            }
        }

        Self { families, index }
    }

    pub fn lookup(&self, identifier: &str) -> Option<&'a PatentFamilyRecord> {
        match_keys(identifier)
            .iter()
            .find_map(|key| self.index.get(key))
            .map(|idx| self.families[*idx])
    }

    /// Every distinct entry lands in exactly one of `found` / `missing`
    pub fn report(&self, entries: &[CanonicalReferenceEntry]) -> CoverageReport {
        let mut seen: HashSet<String> = HashSet::new();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        let mut matrix = BTreeMap::new();

        for entry in entries {
            let key = normalize_identifier(&entry.identifier);
            if key.is_empty() {
                // Unmatchable, but still accounted for
                if seen.insert(format!("raw:{}", entry.identifier.trim())) {
                    warn!(identifier = %entry.identifier, "Canonical identifier has no alphanumeric content");
                    missing.push(entry.clone());
                }
                continue;
            }
            if !seen.insert(key) {
                continue;
            }
            match self.lookup(&entry.identifier) {
                Some(family) => {
                    matrix.insert(family.family_id.clone(), family.contributing_providers.clone());
                    found.push(FoundEntry {
                        entry: entry.clone(),
                        family_id: family.family_id.clone(),
                        contributing_providers: family.contributing_providers.clone(),
                    });
                }
                None => missing.push(entry.clone()),
            }
        }

        let canonical_count = found.len() + missing.len();
        let coverage_ratio = if canonical_count == 0 {
            1.0
        } else {
            found.len() as f64 / canonical_count as f64
        };

        info!(
            canonical = canonical_count,
            found = found.len(),
            missing = missing.len(),
            coverage_ratio,
            "Coverage computed"
        );

        CoverageReport {
            generated_at: Utc::now(),
            canonical_count,
            found_count: found.len(),
            coverage_ratio,
            found,
            missing,
            provider_coverage_matrix: matrix,
        }
    }
}

pub fn load_canonical(path: &Path) -> Result<Vec<CanonicalReferenceEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read canonical list {}: {}", path.display(), e))
    })?;
    let entries = parse_canonical(&content);
    info!(path = %path.display(), entries = entries.len(), "Canonical list loaded");
    Ok(entries)
}

pub fn parse_canonical(content: &str) -> Vec<CanonicalReferenceEntry> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => return from_json(value),
            Err(e) => warn!(error = %e, "Canonical list looks like JSON but does not parse, reading as text"),
        }
    }
    trimmed.lines().filter_map(from_line).collect()
}

fn from_line(line: &str) -> Option<CanonicalReferenceEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut columns = line.split('|').map(str::trim);
    let identifier = columns.next().filter(|c| !c.is_empty())?;
    let column = |c: Option<&str>| c.filter(|v| !v.is_empty()).map(str::to_string);
    Some(CanonicalReferenceEntry {
        identifier: identifier.to_string(),
        label: column(columns.next()),
        notes: column(columns.next()),
    })
}

fn from_json(value: Value) -> Vec<CanonicalReferenceEntry> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => vec![other],
    };
    items.into_iter().filter_map(from_json_item).collect()
}

fn from_json_item(item: Value) -> Option<CanonicalReferenceEntry> {
    let text = |v: Option<&Value>| -> Option<String> {
        match v? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    match &item {
        Value::Object(map) => {
            let identifier = ["doc_number", "publication_number", "family_id"]
                .iter()
                .find_map(|k| text(map.get(*k)))?;
            Some(CanonicalReferenceEntry {
                identifier,
                label: text(map.get("label")),
                notes: text(map.get("notes")),
            })
        }
        _ => text(Some(&item)).map(CanonicalReferenceEntry::new),
    }
}
