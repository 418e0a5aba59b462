//! Text chunking into family snippets
//!
//! Offsets are character (not byte) positions in the source text.

use crate::types::{PatentFamilyRecord, Snippet};
use patfam_common::identifiers::snippet_hash;

pub const ABSTRACT_SECTION: &str = "abstract";
pub const CLAIMS_SECTION: &str = "claims";
pub const DESCRIPTION_SECTION: &str = "description";

/// Chunk size and overlap (characters) for one section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunking {
    pub size: usize,
    pub overlap: usize,
}

impl Chunking {
    pub fn for_section(section: &str) -> Self {
        match section {
            ABSTRACT_SECTION => Self { size: 1200, overlap: 200 },
            CLAIMS_SECTION => Self { size: 1500, overlap: 250 },
            _ => Self { size: 2000, overlap: 400 },
        }
    }
}

/// Split `text` into overlapping windows; whitespace-only windows are dropped
pub fn chunk_text(section: &str, text: &str, chunking: Chunking) -> Vec<Snippet> {
    let chars: Vec<char> = text.chars().collect();
    let size = chunking.size.max(1);
    let step = size.saturating_sub(chunking.overlap).max(1);

    let mut snippets = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            snippets.push(Snippet {
                section: section.to_string(),
                start_char: start,
                end_char: end,
                text: trimmed.to_string(),
                hash: snippet_hash(section, trimmed),
            });
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    snippets
}

/// Snippets for one section using its default chunking
pub fn section_snippets(section: &str, text: &str) -> Vec<Snippet> {
    chunk_text(section, text, Chunking::for_section(section))
}

/// Snippets from the provider-native abstract, claims, and description
pub fn native_snippets(record: &PatentFamilyRecord) -> Vec<Snippet> {
    let mut snippets = Vec::new();
    if let Some(abstract_text) = &record.abstract_text {
        snippets.extend(section_snippets(ABSTRACT_SECTION, abstract_text));
    }
    if !record.claims.is_empty() {
        snippets.extend(section_snippets(CLAIMS_SECTION, &record.claims.join("\n")));
    }
    if let Some(description) = &record.description {
        snippets.extend(section_snippets(DESCRIPTION_SECTION, description));
    }
    snippets
}

/// Attach native snippets; returns how many were new
pub fn attach_native(record: &mut PatentFamilyRecord) -> usize {
    native_snippets(record)
        .into_iter()
        .filter(|s| record.add_snippet(s.clone()))
        .count()
}
