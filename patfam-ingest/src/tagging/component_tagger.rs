//! Component Tagger
//!
//! Assigns taxonomy labels to a family record. A label applies when any of
//! its patterns matches the claims, abstract, or snippet text
//! (case-insensitive), at least one required classification prefix is present
//! (if any are configured), and no excluded prefix is present.
//!
//! Rules are evaluated independently of each other and tagging only ever adds
//! labels, so re-tagging after enrichment can keep or add tags but never drop
//! one.

use crate::config::ComponentRule;
use crate::types::PatentFamilyRecord;
use patfam_common::identifiers::normalize_identifier;
use patfam_common::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use tracing::debug;

struct CompiledRule {
    label: String,
    patterns: Vec<Regex>,
    required_codes: Vec<String>,
    excluded_codes: Vec<String>,
}

impl CompiledRule {
    fn compile(rule: &ComponentRule) -> Result<Self> {
        let patterns = rule
            .patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p).case_insensitive(true).build().map_err(|e| {
                    Error::Config(format!("taxonomy rule '{}': invalid pattern {:?}: {}", rule.label, p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let prefixes = |codes: &[String]| -> Vec<String> {
            codes
                .iter()
                .map(|c| normalize_identifier(c))
                .filter(|c| !c.is_empty())
                .collect()
        };

        Ok(Self {
            label: rule.label.trim().to_string(),
            patterns,
            required_codes: prefixes(&rule.required_codes),
            excluded_codes: prefixes(&rule.excluded_codes),
        })
    }

    fn matches(&self, texts: &[&str], codes: &[String]) -> bool {
        let has_prefix =
            |prefixes: &[String]| codes.iter().any(|c| prefixes.iter().any(|p| c.starts_with(p.as_str())));

        if !self.excluded_codes.is_empty() && has_prefix(self.excluded_codes.as_slice()) {
            return false;
        }
        if !self.required_codes.is_empty() && !has_prefix(self.required_codes.as_slice()) {
            return false;
        }
        self.patterns
            .iter()
            .any(|pattern| texts.iter().any(|text| pattern.is_match(text)))
    }
}

pub struct ComponentTagger {
    rules: Vec<CompiledRule>,
}

impl ComponentTagger {
    pub fn new(rules: &[ComponentRule]) -> Result<Self> {
        Ok(Self {
            rules: rules.iter().map(CompiledRule::compile).collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.label.as_str()).collect()
    }

    /// Labels the record satisfies; does not touch the record
    pub fn classify(&self, record: &PatentFamilyRecord) -> BTreeSet<String> {
        let mut texts: Vec<&str> = record.claims.iter().map(String::as_str).collect();
        if let Some(abstract_text) = &record.abstract_text {
            texts.push(abstract_text);
        }
        texts.extend(record.snippets.iter().map(|s| s.text.as_str()));

        let codes: Vec<String> = record
            .classification_codes
            .iter()
            .map(|c| normalize_identifier(c))
            .collect();

        self.rules
            .iter()
            .filter(|rule| rule.matches(&texts, &codes))
            .map(|rule| rule.label.clone())
            .collect()
    }

    /// Add every satisfied label; returns how many were new
    pub fn tag(&self, record: &mut PatentFamilyRecord) -> usize {
        let added = record.add_tags(self.classify(record));
        if added > 0 {
            debug!(
                family_id = %record.family_id,
                added,
                tags = ?record.component_tags,
                "Component tags assigned"
            );
        }
        added
    }

    /// Tag every record; returns the number of families that carry any tag
    pub fn tag_all(&self, records: &mut [PatentFamilyRecord]) -> usize {
        for record in records.iter_mut() {
            self.tag(record);
        }
        records.iter().filter(|r| !r.component_tags.is_empty()).count()
    }
}
