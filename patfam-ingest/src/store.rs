//! Family store: hand-off of finalized family records
//!
//! The persistence/retrieval layer consumes families through [`FamilyStore`]:
//! lookups by family id, component tag, and priority-date range. Upserts are
//! idempotent by `family_id`; tags and snippets already stored are kept, so
//! re-ingesting a family can only add to them.

use crate::types::PatentFamilyRecord;
use chrono::NaiveDate;
use patfam_common::config::write_atomic;
use patfam_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub trait FamilyStore {
    /// Insert or replace by `family_id`; returns true when the id was new
    fn upsert(&mut self, record: PatentFamilyRecord) -> bool;

    fn get(&self, family_id: &str) -> Option<&PatentFamilyRecord>;

    /// All families in `family_id` order
    fn families(&self) -> Vec<&PatentFamilyRecord>;

    fn len(&self) -> usize {
        self.families().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn by_component_tag(&self, tag: &str) -> Vec<&PatentFamilyRecord> {
        self.families()
            .into_iter()
            .filter(|f| f.component_tags.contains(tag))
            .collect()
    }

    /// Families whose priority date lies within `from..=to`
    fn by_priority_date_range(&self, from: NaiveDate, to: NaiveDate) -> Vec<&PatentFamilyRecord> {
        self.families()
            .into_iter()
            .filter(|f| f.priority_date.is_some_and(|d| d >= from && d <= to))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryFamilyStore {
    records: BTreeMap<String, PatentFamilyRecord>,
}

impl MemoryFamilyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_records(self) -> Vec<PatentFamilyRecord> {
        self.records.into_values().collect()
    }
}

impl FamilyStore for MemoryFamilyStore {
    fn upsert(&mut self, mut record: PatentFamilyRecord) -> bool {
        match self.records.remove(&record.family_id) {
            Some(previous) => {
                record.add_tags(previous.component_tags);
                let mut snippets = previous.snippets;
                for snippet in std::mem::take(&mut record.snippets) {
                    if !snippets.iter().any(|s| s.hash == snippet.hash) {
                        snippets.push(snippet);
                    }
                }
                record.snippets = snippets;
                self.records.insert(record.family_id.clone(), record);
                false
            }
            None => {
                self.records.insert(record.family_id.clone(), record);
                true
            }
        }
    }

    fn get(&self, family_id: &str) -> Option<&PatentFamilyRecord> {
        self.records.get(family_id)
    }

    fn families(&self) -> Vec<&PatentFamilyRecord> {
        self.records.values().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// JSON Lines export: one family record per line
///
/// Opening reads any existing export so reruns upsert into it; [`Self::flush`]
/// rewrites the file atomically.
#[derive(Debug)]
pub struct JsonlFamilyStore {
    path: PathBuf,
    inner: MemoryFamilyStore,
}

impl JsonlFamilyStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut inner = MemoryFamilyStore::new();
        if path.exists() {
            for record in load_families(&path)? {
                inner.upsert(record);
            }
        }
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<usize> {
        let mut buffer = Vec::new();
        for record in self.inner.families() {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }
        write_atomic(&self.path, &buffer)?;
        info!(path = %self.path.display(), families = self.inner.len(), "Family export written");
        Ok(self.inner.len())
    }
}

impl FamilyStore for JsonlFamilyStore {
    fn upsert(&mut self, record: PatentFamilyRecord) -> bool {
        self.inner.upsert(record)
    }

    fn get(&self, family_id: &str) -> Option<&PatentFamilyRecord> {
        self.inner.get(family_id)
    }

    fn families(&self) -> Vec<&PatentFamilyRecord> {
        self.inner.families()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Read a family export; unparseable lines are skipped with a warning
pub fn load_families(path: &Path) -> Result<Vec<PatentFamilyRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read family export {}: {}", path.display(), e))
    })?;

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PatentFamilyRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = index + 1, error = %e, "Skipping unreadable family line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snippet;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn family(id: &str, date: Option<(i32, u32, u32)>, tags: &[&str]) -> PatentFamilyRecord {
        PatentFamilyRecord {
            family_id: id.to_string(),
            synthesized_family_id: false,
            family_aliases: BTreeSet::new(),
            document_numbers: [format!("US{}", id)].into_iter().collect(),
            jurisdiction: Some("US".into()),
            kind_code: None,
            title: Some(format!("Family {}", id)),
            abstract_text: None,
            description: None,
            claims: Vec::new(),
            classification_codes: Vec::new(),
            applicants: Vec::new(),
            inventors: Vec::new(),
            priority_numbers: Vec::new(),
            priority_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            publication_date: None,
            filing_date: None,
            legal_status: None,
            source_confidence: 0.25,
            contributing_providers: BTreeSet::new(),
            merge_conflicts: BTreeMap::new(),
            component_tags: tags.iter().map(|t| t.to_string()).collect(),
            snippets: Vec::new(),
        }
    }

    #[test]
    fn test_upsert_is_idempotent_and_monotonic() {
        let mut store = MemoryFamilyStore::new();
        assert!(store.upsert(family("1", None, &["cyclization"])));
        assert!(!store.upsert(family("1", None, &["flexizyme"])));
        assert!(!store.upsert(family("1", None, &["flexizyme"])));

        let stored = store.get("1").unwrap();
        assert_eq!(stored.component_tags.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snippets_merge_by_hash() {
        let snippet = |hash: &str| Snippet {
            section: "claims".into(),
            start_char: 0,
            end_char: 1,
            text: "x".into(),
            hash: hash.into(),
        };
        let mut store = MemoryFamilyStore::new();
        let mut first = family("1", None, &[]);
        first.snippets = vec![snippet("a")];
        store.upsert(first);
        let mut second = family("1", None, &[]);
        second.snippets = vec![snippet("a"), snippet("b")];
        store.upsert(second);

        assert_eq!(store.get("1").unwrap().snippets.len(), 2);
    }

    #[test]
    fn test_queries() {
        let mut store = MemoryFamilyStore::new();
        store.upsert(family("1", Some((2010, 1, 1)), &["cyclization"]));
        store.upsert(family("2", Some((2015, 6, 1)), &["flexizyme"]));
        store.upsert(family("3", None, &["cyclization"]));

        assert_eq!(store.by_component_tag("cyclization").len(), 2);
        let from = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2012, 12, 31).unwrap();
        let in_range = store.by_priority_date_range(from, to);
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].family_id, "1");
    }

    #[test]
    fn test_jsonl_round_trip_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/families.jsonl");

        let mut store = JsonlFamilyStore::open(&path).unwrap();
        store.upsert(family("1", Some((2010, 1, 1)), &["cyclization"]));
        store.upsert(family("2", None, &[]));
        assert_eq!(store.flush().unwrap(), 2);

        let mut reopened = JsonlFamilyStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        reopened.upsert(family("1", Some((2010, 1, 1)), &[]));
        assert!(reopened.get("1").unwrap().component_tags.contains("cyclization"));
    }

    #[test]
    fn test_load_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("families.jsonl");
        let good = serde_json::to_string(&family("1", None, &[])).unwrap();
        std::fs::write(&path, format!("{}\nnot json\n\n", good)).unwrap();

        assert_eq!(load_families(&path).unwrap().len(), 1);
        assert!(load_families(&dir.path().join("missing.jsonl")).is_err());
    }
}
