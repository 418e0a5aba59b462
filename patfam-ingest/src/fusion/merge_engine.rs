//! Merge Engine
//!
//! Collapses one [`PatentFamily`] into its canonical [`PatentFamilyRecord`].
//!
//! # Field policy
//! - Scalars: value from the record with the highest `source_confidence`;
//!   ties go to the higher-priority provider, then the smaller document
//!   number, then the smaller value. Every losing value that differs from the
//!   winner is kept in `merge_conflicts[field]`.
//! - Sets: union across records, de-duplicated by case-insensitive,
//!   whitespace-collapsed equality, in provider-priority order.
//! - `legal_status`: only from providers that report it; the record with the
//!   latest publication date wins and the disagreement is recorded.
//!
//! Merging is a pure function of the family's record set.

use crate::types::{
    completeness, ConflictValue, NormalizedPatentRecord, PatentFamily, PatentFamilyRecord,
    ProviderPriority,
};
use patfam_common::identifiers::normalize_text;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;
use tracing::debug;

pub type Conflicts = BTreeMap<String, Vec<ConflictValue>>;

pub struct MergeEngine {
    priority: ProviderPriority,
}

impl MergeEngine {
    pub fn new(priority: ProviderPriority) -> Self {
        Self { priority }
    }

    pub fn merge_all(&self, families: &[PatentFamily]) -> Vec<PatentFamilyRecord> {
        families.iter().map(|f| self.merge(f)).collect()
    }

    pub fn merge(&self, family: &PatentFamily) -> PatentFamilyRecord {
        let records = self.ordered(&family.records);
        let mut conflicts = Conflicts::new();

        let jurisdiction = self.scalar(&records, "jurisdiction", |r| r.jurisdiction.clone(), &mut conflicts);
        let kind_code = self.scalar(&records, "kind_code", |r| r.kind_code.clone(), &mut conflicts);
        let title = self.scalar(&records, "title", |r| r.title.clone(), &mut conflicts);
        let abstract_text = self.scalar(&records, "abstract", |r| r.abstract_text.clone(), &mut conflicts);
        let description = self.scalar(&records, "description", |r| r.description.clone(), &mut conflicts);
        let priority_date = self.scalar(&records, "priority_date", |r| r.priority_date, &mut conflicts);
        let publication_date =
            self.scalar(&records, "publication_date", |r| r.publication_date, &mut conflicts);
        let filing_date = self.scalar(&records, "filing_date", |r| r.filing_date, &mut conflicts);
        let legal_status = self.legal_status(&records, &mut conflicts);

        let claims = union(&records, |r| &r.claims);
        let classification_codes = union(&records, |r| &r.classification_codes);
        let applicants = union(&records, |r| &r.applicants);
        let inventors = union(&records, |r| &r.inventors);
        let priority_numbers = union(&records, |r| &r.priority_numbers);

        let source_confidence = completeness(&[
            title.is_some(),
            abstract_text.is_some(),
            !claims.is_empty(),
            !classification_codes.is_empty(),
            !applicants.is_empty(),
            !inventors.is_empty(),
            priority_date.is_some(),
            publication_date.is_some(),
        ]);

        if !conflicts.is_empty() {
            debug!(
                family_id = %family.family_id,
                fields = ?conflicts.keys().collect::<Vec<_>>(),
                "Merge conflicts recorded"
            );
        }

        PatentFamilyRecord {
            family_id: family.family_id.clone(),
            synthesized_family_id: family.synthesized,
            family_aliases: family.family_aliases.clone(),
            document_numbers: family.document_numbers.clone(),
            jurisdiction,
            kind_code,
            title,
            abstract_text,
            description,
            claims,
            classification_codes,
            applicants,
            inventors,
            priority_numbers,
            priority_date,
            publication_date,
            filing_date,
            legal_status,
            source_confidence,
            contributing_providers: records.iter().map(|r| r.provider_id).collect::<BTreeSet<_>>(),
            merge_conflicts: conflicts,
            component_tags: BTreeSet::new(),
            snippets: Vec::new(),
        }
    }

    /// Records in provider-priority order; fully deterministic
    fn ordered<'a>(&self, records: &'a [NormalizedPatentRecord]) -> Vec<&'a NormalizedPatentRecord> {
        let mut keyed: Vec<(&NormalizedPatentRecord, String)> = records
            .iter()
            .map(|r| (r, serde_json::to_string(r).unwrap_or_default()))
            .collect();
        keyed.sort_by(|(a, ka), (b, kb)| {
            self.priority
                .rank(a.provider_id)
                .cmp(&self.priority.rank(b.provider_id))
                .then_with(|| a.document_number.cmp(&b.document_number))
                .then_with(|| ka.cmp(kb))
        });
        keyed.into_iter().map(|(r, _)| r).collect()
    }

    fn scalar<T, F>(
        &self,
        records: &[&NormalizedPatentRecord],
        field: &str,
        get: F,
        conflicts: &mut Conflicts,
    ) -> Option<T>
    where
        T: Clone + Ord + Display,
        F: Fn(&NormalizedPatentRecord) -> Option<T>,
    {
        let mut candidates: Vec<(&NormalizedPatentRecord, T)> =
            records.iter().filter_map(|r| get(r).map(|v| (*r, v))).collect();
        candidates.sort_by(|(a, va), (b, vb)| {
            b.source_confidence
                .total_cmp(&a.source_confidence)
                .then_with(|| self.by_provider(a, b))
                .then_with(|| va.cmp(vb))
        });

        let (_, winner) = candidates.first()?.clone();
        record_losers(field, &winner, &candidates[1..], conflicts);
        Some(winner)
    }

    fn legal_status(
        &self,
        records: &[&NormalizedPatentRecord],
        conflicts: &mut Conflicts,
    ) -> Option<String> {
        let mut candidates: Vec<(&NormalizedPatentRecord, String)> = records
            .iter()
            .filter_map(|r| r.legal_status.clone().map(|s| (*r, s)))
            .collect();
        // None sorts before any date, so undated reports lose
        candidates.sort_by(|(a, va), (b, vb)| {
            b.publication_date
                .cmp(&a.publication_date)
                .then_with(|| self.by_provider(a, b))
                .then_with(|| va.cmp(vb))
        });

        let (_, winner) = candidates.first()?.clone();
        record_losers("legal_status", &winner, &candidates[1..], conflicts);
        Some(winner)
    }

    fn by_provider(&self, a: &NormalizedPatentRecord, b: &NormalizedPatentRecord) -> Ordering {
        self.priority
            .rank(a.provider_id)
            .cmp(&self.priority.rank(b.provider_id))
            .then_with(|| a.document_number.cmp(&b.document_number))
    }
}

fn record_losers<T: Display>(
    field: &str,
    winner: &T,
    losers: &[(&NormalizedPatentRecord, T)],
    conflicts: &mut Conflicts,
) {
    let winning = normalize_text(&winner.to_string());
    let mut values: Vec<ConflictValue> = losers
        .iter()
        .map(|(r, v)| ConflictValue {
            provider_id: r.provider_id,
            value: v.to_string(),
        })
        .filter(|c| normalize_text(&c.value) != winning)
        .collect();
    if values.is_empty() {
        return;
    }
    values.sort();
    values.dedup();
    conflicts.insert(field.to_string(), values);
}

fn union<F>(records: &[&NormalizedPatentRecord], get: F) -> Vec<String>
where
    F: Fn(&NormalizedPatentRecord) -> &Vec<String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for record in records {
        for value in get(record) {
            if seen.insert(normalize_text(value)) {
                merged.push(value.clone());
            }
        }
    }
    merged
}
