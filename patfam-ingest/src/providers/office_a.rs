//! Office-A adapter (PatentsView-style JSON query API)
//!
//! POSTs `{"q": criteria, "f": fields, "o": {"page", "per_page"}}`; pages are
//! 1-based on the wire. Responses carry `patents[]` and `total_patent_count`.
//! An API key is optional and sent as `X-Api-Key` when configured.

use super::payload::{require_document_number, ClaimsField, IdValue};
use super::query::office_a_criteria;
use super::{HttpContext, ParsedPage, ProviderAdapter};
use crate::config::{OfficeConfig, ProviderCredentials, QueryTemplate};
use crate::error::ProviderError;
use crate::types::{NormalizedPatentRecord, ProviderId};
use async_trait::async_trait;
use patfam_common::time::parse_date;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_URL: &str = "https://patentsview.org/api/patents/query";

const FIELDS: &[&str] = &[
    "patent_number",
    "patent_title",
    "patent_abstract",
    "patent_date",
    "patent_application_date",
    "patent_priority_date",
    "patent_kind",
    "patent_country",
    "patent_family_id",
    "cpcs.cpc_subgroup_id",
    "ipcs.ipc_subclass",
    "assignees.assignee_organization",
    "assignees.assignee_individual_name",
    "inventors.inventor_full_name",
];

pub struct OfficeAAdapter {
    http: HttpContext,
    credentials: ProviderCredentials,
    criteria: Value,
}

impl OfficeAAdapter {
    pub fn new(
        config: &OfficeConfig,
        query: &QueryTemplate,
        credentials: ProviderCredentials,
    ) -> patfam_common::Result<Self> {
        Ok(Self {
            http: HttpContext::new(ProviderId::OfficeA, config, DEFAULT_URL)?,
            credentials,
            criteria: office_a_criteria(&query.with_override(config.query.as_ref())),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OfficeAAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OfficeA
    }

    fn query_key(&self) -> String {
        json!({"q": self.criteria, "f": FIELDS}).to_string()
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Value, ProviderError> {
        let body = json!({
            "q": self.criteria,
            "f": FIELDS,
            "o": {"page": page + 1, "per_page": per_page},
        });
        debug!(provider = %ProviderId::OfficeA, page, "Requesting page");

        let mut request = self.http.client().post(self.http.base_url()).json(&body);
        if let Some(key) = &self.credentials.api_key {
            request = request.header("X-Api-Key", key);
        }
        self.http.send_json(request).await
    }

    fn parse_page(&self, payload: &Value) -> Result<ParsedPage, ProviderError> {
        if !payload.is_object() {
            return Err(ProviderError::MalformedRecord {
                provider: ProviderId::OfficeA,
                message: "response is not a JSON object".to_string(),
            });
        }
        Ok(ParsedPage {
            items: payload["patents"].as_array().cloned().unwrap_or_default(),
            total: payload["total_patent_count"].as_u64(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpcEntry {
    pub cpc_subgroup_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpcEntry {
    pub ipc_subclass: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignee {
    pub assignee_organization: Option<String>,
    pub assignee_individual_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Inventor {
    pub inventor_full_name: Option<String>,
}

/// One `patents[]` item
#[derive(Debug, Clone, Deserialize)]
pub struct OfficeARecord {
    pub patent_number: Option<IdValue>,
    pub patent_title: Option<String>,
    pub patent_abstract: Option<String>,
    /// Publication (grant) date
    pub patent_date: Option<String>,
    pub patent_application_date: Option<String>,
    pub patent_priority_date: Option<String>,
    pub patent_kind: Option<String>,
    pub patent_country: Option<String>,
    pub patent_family_id: Option<IdValue>,
    pub claims: Option<ClaimsField>,
    pub cpcs: Option<Vec<CpcEntry>>,
    pub ipcs: Option<Vec<IpcEntry>>,
    pub assignees: Option<Vec<Assignee>>,
    pub inventors: Option<Vec<Inventor>>,
}

impl OfficeARecord {
    pub fn normalize(self) -> Result<NormalizedPatentRecord, ProviderError> {
        let jurisdiction = self
            .patent_country
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "US".to_string());
        let number = self.patent_number.map(IdValue::into_string);
        let document_number =
            require_document_number(ProviderId::OfficeA, number.as_deref(), &jurisdiction)?;

        let mut record = NormalizedPatentRecord::new(ProviderId::OfficeA, document_number);
        record.jurisdiction = Some(jurisdiction);
        record.family_id = self.patent_family_id.map(IdValue::into_string);
        record.kind_code = self.patent_kind;
        record.title = self.patent_title;
        record.abstract_text = self.patent_abstract;
        record.claims = self.claims.map(ClaimsField::into_claims).unwrap_or_default();

        let mut codes: Vec<String> = self
            .cpcs
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.cpc_subgroup_id)
            .collect();
        codes.extend(self.ipcs.unwrap_or_default().into_iter().filter_map(|c| c.ipc_subclass));
        codes.sort();
        codes.dedup();
        record.classification_codes = codes;

        record.applicants = self
            .assignees
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.assignee_organization.or(a.assignee_individual_name))
            .collect();
        record.inventors = self
            .inventors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| i.inventor_full_name)
            .collect();

        record.filing_date = self.patent_application_date.as_deref().and_then(parse_date);
        record.publication_date = self.patent_date.as_deref().and_then(parse_date);
        record.priority_date = self
            .patent_priority_date
            .as_deref()
            .and_then(parse_date)
            .or(record.filing_date);

        Ok(record.finish())
    }
}
