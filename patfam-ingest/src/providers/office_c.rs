//! Office-C adapter (OPS-style CQL search API)
//!
//! GET with `q` (CQL) and `Range: a-b`; key/secret sent as basic auth. Items
//! sit under `ops:world-patent-data / ops:search-response / ops:result`,
//! which is an object for a single hit and a list otherwise. Most nested
//! nodes share that shape, hence the [`OneOrMany`] fields throughout.

use super::payload::{require_document_number, IdValue, OneOrMany};
use super::query::office_c_cql;
use super::{HttpContext, ParsedPage, ProviderAdapter};
use crate::config::{OfficeConfig, ProviderCredentials, QueryTemplate};
use crate::error::ProviderError;
use crate::types::{NormalizedPatentRecord, ProviderId};
use async_trait::async_trait;
use patfam_common::time::parse_date;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_URL: &str = "https://ops.epo.org/3.2/rest-services/published-data/search";

pub struct OfficeCAdapter {
    http: HttpContext,
    credentials: ProviderCredentials,
    cql: String,
}

impl OfficeCAdapter {
    pub fn new(
        config: &OfficeConfig,
        query: &QueryTemplate,
        credentials: ProviderCredentials,
    ) -> patfam_common::Result<Self> {
        Ok(Self {
            http: HttpContext::new(ProviderId::OfficeC, config, DEFAULT_URL)?,
            credentials,
            cql: office_c_cql(&query.with_override(config.query.as_ref())),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OfficeCAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OfficeC
    }

    fn query_key(&self) -> String {
        self.cql.clone()
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        if self.credentials.key.is_some() && self.credentials.secret.is_some() {
            Ok(())
        } else {
            Err(ProviderError::Authentication {
                provider: ProviderId::OfficeC,
                message: "missing consumer key or secret".to_string(),
            })
        }
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Value, ProviderError> {
        let first = u64::from(page) * u64::from(per_page);
        let last = first + u64::from(per_page.max(1)) - 1;
        let range = format!("{}-{}", first, last);
        debug!(provider = %ProviderId::OfficeC, page, range = %range, "Requesting page");

        let request = self
            .http
            .client()
            .get(self.http.base_url())
            .query(&[("q", self.cql.as_str()), ("Range", range.as_str())])
            .header("Accept", "application/json")
            .basic_auth(
                self.credentials.key.as_deref().unwrap_or_default(),
                self.credentials.secret.as_deref(),
            );
        self.http.send_json(request).await
    }

    fn parse_page(&self, payload: &Value) -> Result<ParsedPage, ProviderError> {
        if !payload.is_object() {
            return Err(ProviderError::MalformedRecord {
                provider: ProviderId::OfficeC,
                message: "response is not a JSON object".to_string(),
            });
        }
        let world = &payload["ops:world-patent-data"];
        let items = match &world["ops:search-response"]["ops:result"] {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![world["ops:search-response"]["ops:result"].clone()],
            _ => Vec::new(),
        };
        let total = match &world["ops:biblio-search"]["@total-result-count"] {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_u64(),
        };
        Ok(ParsedPage { items, total })
    }
}

/// Text as a bare string or a `{"$": ..., "@lang": ...}` node
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextNode {
    Plain(String),
    Node {
        #[serde(rename = "$")]
        value: Option<String>,
        #[serde(rename = "@lang")]
        lang: Option<String>,
    },
}

impl TextNode {
    fn text(&self) -> Option<&str> {
        match self {
            TextNode::Plain(s) => Some(s),
            TextNode::Node { value, .. } => value.as_deref(),
        }
    }

    fn is_english(&self) -> bool {
        matches!(self, TextNode::Node { lang: Some(l), .. } if l.eq_ignore_ascii_case("en"))
    }
}

/// Pick the English text if tagged, else the first one
fn preferred_text(nodes: Vec<TextNode>) -> Option<String> {
    nodes
        .iter()
        .find(|n| n.is_english())
        .or_else(|| nodes.first())
        .and_then(TextNode::text)
        .map(str::to_string)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AbstractNode {
    Plain(String),
    Node {
        p: Option<OneOrMany<TextNode>>,
        #[serde(rename = "$")]
        value: Option<String>,
        #[serde(rename = "@lang")]
        lang: Option<String>,
    },
}

impl AbstractNode {
    fn text(self) -> Option<String> {
        match self {
            AbstractNode::Plain(s) => Some(s),
            AbstractNode::Node { p, value, .. } => p
                .map(|p| {
                    p.into_vec()
                        .iter()
                        .filter_map(TextNode::text)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .filter(|t| !t.is_empty())
                .or(value),
        }
    }

    fn is_english(&self) -> bool {
        matches!(self, AbstractNode::Node { lang: Some(l), .. } if l.eq_ignore_ascii_case("en"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartyName {
    pub name: Option<TextNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Party {
    Plain(String),
    Node {
        name: Option<TextNode>,
        #[serde(rename = "applicant-name", alias = "inventor-name")]
        nested: Option<PartyName>,
    },
}

impl Party {
    fn into_name(self) -> Option<String> {
        match self {
            Party::Plain(name) => Some(name),
            Party::Node { name, nested } => name
                .or_else(|| nested.and_then(|n| n.name))
                .and_then(|n| n.text().map(str::to_string)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PartyGroup {
    Plain(String),
    Group {
        #[serde(alias = "applicant", alias = "inventor")]
        name: Option<OneOrMany<Party>>,
    },
}

fn party_names(groups: Option<OneOrMany<PartyGroup>>) -> Vec<String> {
    let mut names = Vec::new();
    for group in groups.map(OneOrMany::into_vec).unwrap_or_default() {
        match group {
            PartyGroup::Plain(name) => names.push(name),
            PartyGroup::Group { name } => {
                names.extend(
                    name.map(OneOrMany::into_vec)
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(Party::into_name),
                );
            }
        }
    }
    names
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentId {
    #[serde(rename = "doc-number")]
    pub doc_number: Option<IdValue>,
    pub country: Option<IdValue>,
    pub kind: Option<IdValue>,
    pub date: Option<IdValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    #[serde(rename = "document-id")]
    pub document_id: Option<OneOrMany<DocumentId>>,
}

impl Reference {
    fn first(self) -> Option<DocumentId> {
        self.document_id
            .map(OneOrMany::into_vec)
            .and_then(|ids| ids.into_iter().next())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    pub text: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Classifications {
    pub classification: Option<OneOrMany<Classification>>,
}

fn classification_codes(node: Option<Classifications>) -> Vec<String> {
    node.and_then(|c| c.classification)
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.text.or(c.symbol))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityClaim {
    #[serde(rename = "doc-number")]
    pub doc_number: Option<IdValue>,
    pub date: Option<IdValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityClaims {
    #[serde(rename = "priority-claim")]
    pub priority_claim: Option<OneOrMany<PriorityClaim>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BibliographicData {
    #[serde(rename = "publication-reference")]
    pub publication_reference: Option<Reference>,
    #[serde(rename = "application-reference")]
    pub application_reference: Option<Reference>,
    #[serde(rename = "invention-title")]
    pub invention_title: Option<OneOrMany<TextNode>>,
    #[serde(rename = "abstract")]
    pub abstract_node: Option<OneOrMany<AbstractNode>>,
    #[serde(alias = "applicants", alias = "parties")]
    pub assignees: Option<OneOrMany<PartyGroup>>,
    pub inventors: Option<OneOrMany<PartyGroup>>,
    #[serde(rename = "classifications-cpc")]
    pub classifications_cpc: Option<Classifications>,
    #[serde(rename = "classifications-ipc")]
    pub classifications_ipc: Option<Classifications>,
    #[serde(rename = "priority-claims")]
    pub priority_claims: Option<PriorityClaims>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpsDocument {
    #[serde(rename = "@family-id", alias = "family-id")]
    pub family_id: Option<IdValue>,
    #[serde(rename = "bibliographic-data")]
    pub bibliographic_data: Option<BibliographicData>,
    #[serde(rename = "application-reference")]
    pub application_reference: Option<Reference>,
}

/// One `ops:result` item
#[derive(Debug, Clone, Deserialize)]
pub struct OfficeCRecord {
    pub document: Option<OpsDocument>,
}

impl OfficeCRecord {
    pub fn normalize(self) -> Result<NormalizedPatentRecord, ProviderError> {
        let document = self.document.ok_or_else(|| ProviderError::MalformedRecord {
            provider: ProviderId::OfficeC,
            message: "result has no document node".to_string(),
        })?;
        let biblio = document
            .bibliographic_data
            .ok_or_else(|| ProviderError::MalformedRecord {
                provider: ProviderId::OfficeC,
                message: "document has no bibliographic data".to_string(),
            })?;

        let publication = biblio.publication_reference.and_then(Reference::first);
        let jurisdiction = publication
            .as_ref()
            .and_then(|p| p.country.clone())
            .map(|c| c.into_string().trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "EP".to_string());
        let number = publication
            .as_ref()
            .and_then(|p| p.doc_number.clone())
            .map(IdValue::into_string);
        let document_number =
            require_document_number(ProviderId::OfficeC, number.as_deref(), &jurisdiction)?;

        let mut record = NormalizedPatentRecord::new(ProviderId::OfficeC, document_number);
        record.jurisdiction = Some(jurisdiction);
        record.family_id = document.family_id.map(IdValue::into_string);
        record.kind_code = publication
            .as_ref()
            .and_then(|p| p.kind.clone())
            .map(IdValue::into_string);
        record.publication_date = publication
            .as_ref()
            .and_then(|p| p.date.clone())
            .and_then(|d| parse_date(&d.into_string()));

        record.title = biblio
            .invention_title
            .map(OneOrMany::into_vec)
            .and_then(preferred_text);
        record.abstract_text = biblio.abstract_node.map(OneOrMany::into_vec).and_then(|nodes| {
            let english = nodes.iter().position(AbstractNode::is_english).unwrap_or(0);
            nodes.into_iter().nth(english).and_then(AbstractNode::text)
        });

        record.applicants = party_names(biblio.assignees);
        record.inventors = party_names(biblio.inventors);

        let mut codes = classification_codes(biblio.classifications_cpc);
        codes.extend(classification_codes(biblio.classifications_ipc));
        for code in codes.iter_mut() {
            *code = code.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        codes.sort();
        codes.dedup();
        record.classification_codes = codes;

        let claims = biblio
            .priority_claims
            .and_then(|p| p.priority_claim)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();
        record.priority_numbers = claims
            .iter()
            .filter_map(|c| c.doc_number.clone().map(IdValue::into_string))
            .collect();

        record.filing_date = document
            .application_reference
            .or(biblio.application_reference)
            .and_then(Reference::first)
            .and_then(|d| d.date)
            .and_then(|d| parse_date(&d.into_string()));
        record.priority_date = claims
            .iter()
            .filter_map(|c| c.date.clone().and_then(|d| parse_date(&d.into_string())))
            .min()
            .or(record.filing_date);

        Ok(record.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderPayload;
    use chrono::NaiveDate;
    use serde_json::json;

    fn adapter() -> OfficeCAdapter {
        OfficeCAdapter::new(
            &OfficeConfig::default(),
            &QueryTemplate::default(),
            ProviderCredentials {
                key: Some("k".into()),
                secret: Some("s".into()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn ops_item() -> Value {
        json!({
            "document": {
                "@family-id": "54321",
                "bibliographic-data": {
                    "publication-reference": {
                        "document-id": {"doc-number": {"$": "3012345"}, "country": "EP", "kind": "A1", "date": "20160504"}
                    },
                    "invention-title": [
                        {"@lang": "de", "$": "Zyklische Peptide"},
                        {"@lang": "en", "$": "Cyclic peptide libraries"}
                    ],
                    "abstract": {"@lang": "en", "p": {"$": "N-methyl amino acids are incorporated."}},
                    "applicants": {"applicant": [{"name": {"$": "PeptiDream Inc"}}, "Chugai"]},
                    "inventors": {"inventor": {"inventor-name": {"name": {"$": "Suga Hiroaki"}}}},
                    "classifications-cpc": {"classification": [{"text": "C07K  7/64"}, {"symbol": "C12N15/10"}]},
                    "priority-claims": {"priority-claim": [
                        {"doc-number": "JP2014001", "date": "20140301"},
                        {"doc-number": "JP2013999", "date": "20130901"}
                    ]}
                },
                "application-reference": {"document-id": {"date": "20150228"}}
            }
        })
    }

    #[test]
    fn test_normalize_nested_ops_document() {
        let record = ProviderPayload::decode(ProviderId::OfficeC, ops_item())
            .unwrap()
            .normalize()
            .unwrap();

        assert_eq!(record.document_number, "EP3012345");
        assert_eq!(record.family_id.as_deref(), Some("54321"));
        assert_eq!(record.title.as_deref(), Some("Cyclic peptide libraries"));
        assert_eq!(
            record.abstract_text.as_deref(),
            Some("N-methyl amino acids are incorporated.")
        );
        assert_eq!(record.applicants, vec!["PeptiDream Inc", "Chugai"]);
        assert_eq!(record.inventors, vec!["Suga Hiroaki"]);
        assert_eq!(record.classification_codes, vec!["C07K 7/64", "C12N15/10"]);
        assert_eq!(record.priority_numbers, vec!["JP2014001", "JP2013999"]);
        assert_eq!(record.priority_date, NaiveDate::from_ymd_opt(2013, 9, 1));
        assert_eq!(record.filing_date, NaiveDate::from_ymd_opt(2015, 2, 28));
        assert_eq!(record.publication_date, NaiveDate::from_ymd_opt(2016, 5, 4));
    }

    #[test]
    fn test_parse_page_single_result_object() {
        let page = json!({
            "ops:world-patent-data": {
                "ops:biblio-search": {"@total-result-count": "1"},
                "ops:search-response": {"ops:result": ops_item()}
            }
        });
        let parsed = adapter().parse_page(&page).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.total, Some(1));
    }

    #[test]
    fn test_parse_page_list_and_missing() {
        let page = json!({
            "ops:world-patent-data": {
                "ops:search-response": {"ops:result": [ops_item(), ops_item()]}
            }
        });
        assert_eq!(adapter().parse_page(&page).unwrap().items.len(), 2);
        assert!(adapter().parse_page(&json!({})).unwrap().items.is_empty());
    }

    #[test]
    fn test_credentials_require_key_and_secret() {
        let adapter = OfficeCAdapter::new(
            &OfficeConfig::default(),
            &QueryTemplate::default(),
            ProviderCredentials {
                key: Some("k".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(adapter.check_credentials().is_err());
    }
}
