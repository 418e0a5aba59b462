//! Patent identifier and text normalization
//!
//! Providers format the same publication differently ("US 10,123,456 B2",
//! "us10123456b2", "10123456" + country "US"). Every comparison of document
//! numbers or family ids in patfam goes through [`normalize_identifier`], so
//! the family resolver and the coverage reporter agree on what "the same
//! identifier" means.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Prefix for family ids synthesized from a document number
pub const SYNTHESIZED_PREFIX: &str = "SYN-";

/// Upper-case and strip every non-alphanumeric character.
///
/// `"US 10,123,456 B2"` → `"US10123456B2"`, `"fam-1"` → `"FAM1"`.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Normalize a document number and make sure it carries a jurisdiction prefix.
///
/// PatentsView-style payloads report bare numbers ("10123456") with the
/// country in a separate field.
pub fn document_number(raw: &str, jurisdiction: &str) -> String {
    let normalized = normalize_identifier(raw);
    if normalized.is_empty() {
        return normalized;
    }

    let has_prefix = normalized
        .chars()
        .take(2)
        .filter(|c| c.is_ascii_alphabetic())
        .count()
        == 2;
    if has_prefix {
        return normalized;
    }

    let country = normalize_identifier(jurisdiction);
    format!("{}{}", country, normalized)
}

/// Drop a trailing kind code ("A1", "B2", "A") from a normalized document number.
///
/// Only strips when the kind code follows a digit, so family ids such as
/// "FAM1" are left untouched.
pub fn strip_kind_code(normalized: &str) -> &str {
    // Kind codes are ASCII, so the cut point is a byte offset from the end
    // and always lands on a char boundary.
    let mut tail = normalized.chars().rev();
    let last = tail.next();
    let second = tail.next();
    let third = tail.next();

    match (last, second, third) {
        // Letter + digit ("B2")
        (Some(l), Some(s), Some(t))
            if l.is_ascii_digit() && s.is_ascii_alphabetic() && t.is_ascii_digit() =>
        {
            &normalized[..normalized.len() - 2]
        }
        // Single letter ("A")
        (Some(l), Some(s), _) if l.is_ascii_alphabetic() && s.is_ascii_digit() => {
            &normalized[..normalized.len() - 1]
        }
        _ => normalized,
    }
}

/// All keys an identifier can be matched under (normalized, and without kind code).
pub fn match_keys(raw: &str) -> Vec<String> {
    let normalized = normalize_identifier(raw);
    if normalized.is_empty() {
        return Vec::new();
    }
    let stripped = strip_kind_code(&normalized).to_string();
    if stripped != normalized {
        vec![normalized, stripped]
    } else {
        vec![normalized]
    }
}

/// Synthesize a family id from a document number.
///
/// Pure function of the normalized document number, so reruns over the same
/// input always reproduce the same id.
pub fn synthesize_family_id(document_number: &str) -> String {
    let digest = Sha256::digest(normalize_identifier(document_number).as_bytes());
    let hex = format!("{:x}", digest);
    format!("{}{}", SYNTHESIZED_PREFIX, &hex[..16])
}

/// Case-insensitive, whitespace-collapsed form used for set de-duplication.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lower-cased alphanumeric tokens of a title.
pub fn title_tokens(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// SHA-256 content hash of a text snippet within a section.
pub fn snippet_hash(section: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(section.as_bytes());
    hasher.update(b":");
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators_and_case() {
        assert_eq!(normalize_identifier("US 10,123,456 B2"), "US10123456B2");
        assert_eq!(normalize_identifier("fam-1"), "FAM1");
        assert_eq!(normalize_identifier("  WO/2020/123456  "), "WO2020123456");
    }

    #[test]
    fn test_strip_kind_code_with_non_ascii_prefix() {
        assert_eq!(strip_kind_code("特許1234567B2"), "特許1234567");
        assert_eq!(strip_kind_code("特許1234999B2"), "特許1234999");
        assert_eq!(strip_kind_code("番1A"), "番1");
        assert_eq!(strip_kind_code("番号"), "番号");
        assert_eq!(match_keys("番1A"), vec!["番1A".to_string(), "番1".to_string()]);
    }

    #[test]
    fn test_document_number_adds_jurisdiction() {
        assert_eq!(document_number("10123456", "us"), "US10123456");
        assert_eq!(document_number("EP1234567", "US"), "EP1234567");
        assert_eq!(document_number("", "US"), "");
    }

    #[test]
    fn test_strip_kind_code() {
        assert_eq!(strip_kind_code("US1234567B2"), "US1234567");
        assert_eq!(strip_kind_code("EP1234567A"), "EP1234567");
        assert_eq!(strip_kind_code("US1234567"), "US1234567");
        assert_eq!(strip_kind_code("FAM1"), "FAM1");
    }

    #[test]
    fn test_match_keys() {
        assert_eq!(match_keys("us1234567 b2"), vec!["US1234567B2", "US1234567"]);
        assert_eq!(match_keys("FAM1"), vec!["FAM1"]);
        assert!(match_keys(" - ").is_empty());
    }

    #[test]
    fn test_synthesized_id_is_stable() {
        let a = synthesize_family_id("US 1234567");
        let b = synthesize_family_id("us1234567");
        assert_eq!(a, b);
        assert!(a.starts_with(SYNTHESIZED_PREFIX));
        assert_eq!(a.len(), SYNTHESIZED_PREFIX.len() + 16);
        assert_ne!(a, synthesize_family_id("US1234568"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Cyclic   PEPTIDE\n"), "cyclic peptide");
    }

    #[test]
    fn test_snippet_hash_ignores_whitespace_and_case() {
        assert_eq!(
            snippet_hash("claims", "A  Cyclic peptide"),
            snippet_hash("claims", "a cyclic PEPTIDE")
        );
        assert_ne!(
            snippet_hash("claims", "a cyclic peptide"),
            snippet_hash("abstract", "a cyclic peptide")
        );
    }
}
