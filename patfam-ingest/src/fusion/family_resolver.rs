//! Family Resolver
//!
//! Partitions the union of normalized records from every provider into
//! [`PatentFamily`] groups.
//!
//! # Grouping
//! 1. Records sharing a normalized provider family id are one family, and so
//!    are records sharing a document number (kind code ignored). This is a
//!    union-find over both keys, so every document number lands in exactly one
//!    group.
//! 2. Groups with no family id at all fall back to a title-similarity match
//!    against already-placed groups: some record in the candidate must come
//!    from a different provider, share the priority date, and have a title
//!    whose normalized Levenshtein similarity (over sorted title tokens)
//!    reaches the configured threshold.
//! 3. Anything still unplaced becomes its own family with an id synthesized
//!    from its smallest document number.
//!
//! The result depends only on the set of input records, never on their order.

use crate::config::ResolverConfig;
use crate::types::{NormalizedPatentRecord, PatentFamily, ProviderPriority};
use patfam_common::identifiers::{strip_kind_code, synthesize_family_id, title_tokens};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Output of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Sorted by `family_id`
    pub families: Vec<PatentFamily>,
    pub synthesized: usize,
    pub similarity_merges: usize,
}

pub struct FamilyResolver {
    title_similarity_threshold: f64,
    require_priority_date_match: bool,
    priority: ProviderPriority,
}

impl FamilyResolver {
    pub fn new(config: &ResolverConfig, priority: ProviderPriority) -> Self {
        Self {
            title_similarity_threshold: config.title_similarity_threshold.clamp(0.0, 1.0),
            require_priority_date_match: config.require_priority_date_match,
            priority,
        }
    }

    pub fn resolve(&self, mut records: Vec<NormalizedPatentRecord>) -> Resolution {
        records.sort_by(|a, b| {
            a.document_number
                .cmp(&b.document_number)
                .then_with(|| self.priority.rank(a.provider_id).cmp(&self.priority.rank(b.provider_id)))
                .then_with(|| a.family_id.cmp(&b.family_id))
                .then_with(|| a.title.cmp(&b.title))
        });

        let mut sets = DisjointSet::new(records.len());
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            let mut keys = vec![format!("D:{}", strip_kind_code(&record.document_number))];
            if let Some(fid) = &record.family_id {
                keys.push(format!("F:{}", fid));
            }
            for key in keys {
                match first_seen.get(&key) {
                    Some(&other) => sets.union(idx, other),
                    None => {
                        first_seen.insert(key, idx);
                    }
                }
            }
        }

        // Components in order of their smallest member (records are sorted)
        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..records.len() {
            let root = sets.find(idx);
            components.entry(root).or_default().push(idx);
        }
        let mut groups: Vec<Vec<usize>> = components.into_values().collect();
        groups.sort_by_key(|members| members[0]);

        let (anchored, unanchored): (Vec<Vec<usize>>, Vec<Vec<usize>>) = groups
            .into_iter()
            .partition(|members| members.iter().any(|i| records[*i].family_id.is_some()));

        let tokens: Vec<Option<String>> = records
            .iter()
            .map(|r| {
                r.title
                    .as_deref()
                    .map(title_tokens)
                    .filter(|t| !t.is_empty())
                    .map(|t| t.into_iter().collect::<Vec<_>>().join(" "))
            })
            .collect();

        let mut placed: Vec<Vec<usize>> = anchored;
        let mut similarity_merges = 0;
        for group in unanchored {
            match self.best_match(&records, &tokens, &placed, &group) {
                Some(target) => {
                    debug!(
                        document_numbers = ?group.iter().map(|i| &records[*i].document_number).collect::<Vec<_>>(),
                        into = %records[placed[target][0]].document_number,
                        "Title similarity merge"
                    );
                    placed[target].extend(group);
                    similarity_merges += 1;
                }
                None => placed.push(group),
            }
        }

        let mut synthesized = 0;
        let mut families: Vec<PatentFamily> = placed
            .into_iter()
            .map(|members| {
                let family = self.build_family(members.iter().map(|i| &records[*i]));
                if family.synthesized {
                    synthesized += 1;
                }
                family
            })
            .collect();
        families.sort_by(|a, b| a.family_id.cmp(&b.family_id));

        info!(
            records = records.len(),
            families = families.len(),
            synthesized,
            similarity_merges,
            "Family resolution complete"
        );

        Resolution {
            families,
            synthesized,
            similarity_merges,
        }
    }

    /// Index into `placed` of the best similarity candidate for `group`
    fn best_match(
        &self,
        records: &[NormalizedPatentRecord],
        tokens: &[Option<String>],
        placed: &[Vec<usize>],
        group: &[usize],
    ) -> Option<usize> {
        let mut best: Option<(f64, String, usize)> = None;

        for (target, members) in placed.iter().enumerate() {
            let mut score: Option<f64> = None;
            for &r in group {
                for &c in members {
                    if let Some(s) = self.pair_similarity(records, tokens, r, c) {
                        score = Some(score.map_or(s, |prev: f64| prev.max(s)));
                    }
                }
            }
            let Some(score) = score else { continue };

            let key = group_key(members.iter().map(|i| &records[*i]));
            let better = match &best {
                None => true,
                Some((best_score, best_key, _)) => {
                    score > *best_score || (score == *best_score && key < *best_key)
                }
            };
            if better {
                best = Some((score, key, target));
            }
        }

        best.map(|(_, _, target)| target)
    }

    /// Similarity of two records when they are eligible to merge at all
    fn pair_similarity(
        &self,
        records: &[NormalizedPatentRecord],
        tokens: &[Option<String>],
        a: usize,
        b: usize,
    ) -> Option<f64> {
        let (ra, rb) = (&records[a], &records[b]);
        if ra.provider_id == rb.provider_id {
            return None;
        }
        if self.require_priority_date_match
            && (ra.priority_date.is_none() || ra.priority_date != rb.priority_date)
        {
            return None;
        }
        let (ta, tb) = (tokens[a].as_deref()?, tokens[b].as_deref()?);
        let similarity = strsim::normalized_levenshtein(ta, tb);
        (similarity >= self.title_similarity_threshold).then_some(similarity)
    }

    fn build_family<'a, I>(&self, members: I) -> PatentFamily
    where
        I: Iterator<Item = &'a NormalizedPatentRecord>,
    {
        let mut records: Vec<NormalizedPatentRecord> = members.cloned().collect();
        records.sort_by(|a, b| {
            self.priority
                .rank(a.provider_id)
                .cmp(&self.priority.rank(b.provider_id))
                .then_with(|| a.document_number.cmp(&b.document_number))
        });

        let family_aliases: BTreeSet<String> =
            records.iter().filter_map(|r| r.family_id.clone()).collect();
        let document_numbers: BTreeSet<String> =
            records.iter().map(|r| r.document_number.clone()).collect();

        let preferred = records
            .iter()
            .filter_map(|r| r.family_id.as_ref().map(|f| (self.priority.rank(r.provider_id), f)))
            .min()
            .map(|(_, fid)| fid.clone());

        let (family_id, synthesized) = match preferred {
            Some(fid) => (fid, false),
            None => {
                let seed = document_numbers
                    .iter()
                    .map(|d| strip_kind_code(d))
                    .min()
                    .unwrap_or_default();
                (synthesize_family_id(seed), true)
            }
        };

        PatentFamily {
            family_id,
            synthesized,
            family_aliases,
            document_numbers,
            records,
        }
    }
}

/// Stable tie-break key for a placed group
fn group_key<'a, I>(members: I) -> String
where
    I: Iterator<Item = &'a NormalizedPatentRecord>,
{
    let members: Vec<&NormalizedPatentRecord> = members.collect();
    members
        .iter()
        .filter_map(|r| r.family_id.clone())
        .min()
        .or_else(|| members.iter().map(|r| r.document_number.clone()).min())
        .unwrap_or_default()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut idx: usize) -> usize {
        while self.parent[idx] != idx {
            self.parent[idx] = self.parent[self.parent[idx]];
            idx = self.parent[idx];
        }
        idx
    }

    /// Smaller root wins so roots stay the earliest sorted member
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}
