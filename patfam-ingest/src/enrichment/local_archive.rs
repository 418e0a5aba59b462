//! Local archival full-text dump
//!
//! Looks up `<dir>/<DOC>.json` first (`claims`/`claims_text`,
//! `description`/`description_text`; claims may be a list), then
//! `<dir>/<DOC>.txt` as plain description text.

use super::{FullText, FullTextSource};
use crate::error::EnrichmentError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClaimsText {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ArchiveEntry {
    #[serde(alias = "claims_text")]
    claims: Option<ClaimsText>,
    #[serde(alias = "description_text")]
    description: Option<String>,
}

pub struct LocalArchiveSource {
    dir: PathBuf,
}

impl LocalArchiveSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn read_optional(path: &Path) -> Result<Option<String>, EnrichmentError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FullTextSource for LocalArchiveSource {
    fn name(&self) -> &'static str {
        "local_archive"
    }

    async fn fetch(&self, document_number: &str) -> Result<FullText, EnrichmentError> {
        if !self.dir.is_dir() {
            return Err(EnrichmentError::Unavailable(format!(
                "archive directory {} not found",
                self.dir.display()
            )));
        }

        let json_path = self.dir.join(format!("{}.json", document_number));
        if let Some(content) = Self::read_optional(&json_path).await? {
            let entry: ArchiveEntry = serde_json::from_str(&content)
                .map_err(|e| EnrichmentError::Parse(format!("{}: {}", json_path.display(), e)))?;
            return Ok(FullText {
                claims: entry.claims.map(|c| match c {
                    ClaimsText::Text(text) => text,
                    ClaimsText::List(list) => list.join("\n"),
                }),
                description: entry.description,
            });
        }

        let txt_path = self.dir.join(format!("{}.txt", document_number));
        match Self::read_optional(&txt_path).await? {
            Some(description) => Ok(FullText {
                claims: None,
                description: Some(description),
            }),
            None => Err(EnrichmentError::NotFound(document_number.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_entry_with_claim_list() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("US1.json"),
            r#"{"claims": ["1. A method.", "2. A kit."], "description_text": "Details."}"#,
        )
        .unwrap();

        let text = LocalArchiveSource::new(dir.path()).fetch("US1").await.unwrap();
        assert_eq!(text.claims.as_deref(), Some("1. A method.\n2. A kit."));
        assert_eq!(text.description.as_deref(), Some("Details."));
    }

    #[tokio::test]
    async fn test_txt_fallback_and_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("EP2.txt"), "Plain description").unwrap();
        let source = LocalArchiveSource::new(dir.path());

        let text = source.fetch("EP2").await.unwrap();
        assert_eq!(text.description.as_deref(), Some("Plain description"));
        assert!(matches!(source.fetch("EP3").await, Err(EnrichmentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let source = LocalArchiveSource::new("/no/such/archive");
        assert!(matches!(source.fetch("US1").await, Err(EnrichmentError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_corrupt_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("US9.json"), "{not json").unwrap();
        let result = LocalArchiveSource::new(dir.path()).fetch("US9").await;
        assert!(matches!(result, Err(EnrichmentError::Parse(_))));
    }
}
