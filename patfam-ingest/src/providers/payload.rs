//! Provider payload variants
//!
//! Each provider returns its own JSON shape. Items are decoded into one
//! variant of [`ProviderPayload`] and normalized by that variant's explicit
//! function; nothing downstream inspects raw JSON.

use super::manual::ManualRecord;
use super::office_a::OfficeARecord;
use super::office_b::OfficeBRecord;
use super::office_c::OfficeCRecord;
use crate::error::ProviderError;
use crate::types::{NormalizedPatentRecord, ProviderId};
use patfam_common::identifiers::document_number;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// One provider document, tagged by provider
#[derive(Debug, Clone)]
pub enum ProviderPayload {
    OfficeA(OfficeARecord),
    OfficeB(OfficeBRecord),
    OfficeC(OfficeCRecord),
    Manual(ManualRecord),
}

impl ProviderPayload {
    /// Decode one JSON item for the given provider
    pub fn decode(provider: ProviderId, item: serde_json::Value) -> Result<Self, ProviderError> {
        Ok(match provider {
            ProviderId::OfficeA => ProviderPayload::OfficeA(decode_item(provider, item)?),
            ProviderId::OfficeB => ProviderPayload::OfficeB(decode_item(provider, item)?),
            ProviderId::OfficeC => ProviderPayload::OfficeC(decode_item(provider, item)?),
            ProviderId::Manual => ProviderPayload::Manual(decode_item(provider, item)?),
        })
    }

    pub fn provider_id(&self) -> ProviderId {
        match self {
            ProviderPayload::OfficeA(_) => ProviderId::OfficeA,
            ProviderPayload::OfficeB(_) => ProviderId::OfficeB,
            ProviderPayload::OfficeC(_) => ProviderId::OfficeC,
            ProviderPayload::Manual(_) => ProviderId::Manual,
        }
    }

    /// Normalize into the provider-agnostic record
    pub fn normalize(self) -> Result<NormalizedPatentRecord, ProviderError> {
        match self {
            ProviderPayload::OfficeA(r) => r.normalize(),
            ProviderPayload::OfficeB(r) => r.normalize(),
            ProviderPayload::OfficeC(r) => r.normalize(),
            ProviderPayload::Manual(r) => r.normalize(),
        }
    }
}

fn decode_item<T: DeserializeOwned>(
    provider: ProviderId,
    item: serde_json::Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(item).map_err(|e| ProviderError::MalformedRecord {
        provider,
        message: e.to_string(),
    })
}

/// Build the document number or reject the record
pub(crate) fn require_document_number(
    provider: ProviderId,
    raw: Option<&str>,
    jurisdiction: &str,
) -> Result<String, ProviderError> {
    let number = document_number(raw.unwrap_or_default(), jurisdiction);
    if number.is_empty() {
        return Err(ProviderError::MalformedRecord {
            provider,
            message: "record has no document number".to_string(),
        });
    }
    Ok(number)
}

/// A field that is sometimes a single value and sometimes a list
///
/// `Many` is tried first: a lenient `T` could otherwise swallow a short list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }

    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(v) => Some(v),
            OneOrMany::Many(v) => v.first(),
        }
    }
}

/// Scalar reported as a JSON string, a number, or a `{"$": ...}` node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Text(String),
    Number(i64),
    Node {
        #[serde(rename = "$")]
        value: String,
    },
}

impl IdValue {
    pub fn into_string(self) -> String {
        match self {
            IdValue::Text(s) | IdValue::Node { value: s } => s,
            IdValue::Number(n) => n.to_string(),
        }
    }
}

/// Claims given either as one block of text or as a list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClaimsField {
    Text(String),
    List(Vec<String>),
}

impl ClaimsField {
    pub fn into_claims(self) -> Vec<String> {
        match self {
            ClaimsField::Text(text) => split_claims(&text),
            ClaimsField::List(list) => list,
        }
    }
}

/// Split a block of claims on sequential claim numbering (`1.`, `2)`, ...).
///
/// Numbers are only honored in sequence, so "SEQ ID NO. 2." inside claim 1
/// does not start a new claim. Text without numbering is a single claim.
pub fn split_claims(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut starts: Vec<usize> = Vec::new();
    let mut expected = 1u32;
    let mut i = 0;

    while i < bytes.len() {
        let at_boundary = i == 0 || bytes[i - 1].is_ascii_whitespace();
        if at_boundary && bytes[i].is_ascii_digit() {
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            let followed = j + 1 < bytes.len()
                && (bytes[j] == b'.' || bytes[j] == b')')
                && bytes[j + 1].is_ascii_whitespace();
            if followed && text[i..j].parse::<u32>().ok() == Some(expected) {
                starts.push(i);
                expected += 1;
                i = j + 1;
                continue;
            }
            i = j;
            continue;
        }
        i += 1;
    }

    if starts.len() < 2 {
        let whole = text.trim();
        return if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole.to_string()]
        };
    }

    let mut claims = Vec::with_capacity(starts.len() + 1);
    let preamble = text[..starts[0]].trim();
    if !preamble.is_empty() {
        claims.push(preamble.to_string());
    }
    for (idx, start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(text.len());
        let claim = text[*start..end].trim();
        if !claim.is_empty() {
            claims.push(claim.to_string());
        }
    }
    claims
}
