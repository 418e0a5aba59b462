//! Office-B adapter (PATENTSCOPE-style search API)
//!
//! GET with `q`, `rows`, `start`; bearer token required. Result items come
//! back under `patents[]` or `results[]` depending on API version.

use super::payload::{require_document_number, ClaimsField, IdValue, OneOrMany};
use super::query::office_b_query;
use super::{HttpContext, ParsedPage, ProviderAdapter};
use crate::config::{OfficeConfig, ProviderCredentials, QueryTemplate};
use crate::error::ProviderError;
use crate::types::{NormalizedPatentRecord, ProviderId};
use async_trait::async_trait;
use patfam_common::time::parse_date;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_URL: &str = "https://patentscope.wipo.int/search/en/api/v3/search";

pub struct OfficeBAdapter {
    http: HttpContext,
    credentials: ProviderCredentials,
    query: String,
}

impl OfficeBAdapter {
    pub fn new(
        config: &OfficeConfig,
        query: &QueryTemplate,
        credentials: ProviderCredentials,
    ) -> patfam_common::Result<Self> {
        Ok(Self {
            http: HttpContext::new(ProviderId::OfficeB, config, DEFAULT_URL)?,
            credentials,
            query: office_b_query(&query.with_override(config.query.as_ref())),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OfficeBAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OfficeB
    }

    fn query_key(&self) -> String {
        self.query.clone()
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        match &self.credentials.token {
            Some(_) => Ok(()),
            None => Err(ProviderError::Authentication {
                provider: ProviderId::OfficeB,
                message: "missing API token".to_string(),
            }),
        }
    }

    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Value, ProviderError> {
        let token = self.credentials.token.as_deref().unwrap_or_default();
        let start = u64::from(page) * u64::from(per_page);
        debug!(provider = %ProviderId::OfficeB, page, start, "Requesting page");

        let request = self
            .http
            .client()
            .get(self.http.base_url())
            .query(&[
                ("q", self.query.clone()),
                ("rows", per_page.to_string()),
                ("start", start.to_string()),
            ])
            .header("Accept", "application/json")
            .bearer_auth(token);
        self.http.send_json(request).await
    }

    fn parse_page(&self, payload: &Value) -> Result<ParsedPage, ProviderError> {
        if !payload.is_object() {
            return Err(ProviderError::MalformedRecord {
                provider: ProviderId::OfficeB,
                message: "response is not a JSON object".to_string(),
            });
        }
        let items = payload
            .get("patents")
            .or_else(|| payload.get("results"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total = payload
            .get("total")
            .or_else(|| payload.get("totalResults"))
            .and_then(Value::as_u64);
        Ok(ParsedPage { items, total })
    }
}

/// One result item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeBRecord {
    #[serde(alias = "DocNumber")]
    pub publication_number: Option<IdValue>,
    #[serde(alias = "familyID")]
    pub family_id: Option<IdValue>,
    #[serde(alias = "countryCode")]
    pub publication_country: Option<String>,
    pub kind_code: Option<String>,
    #[serde(alias = "inventionTitle")]
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub claims: Option<ClaimsField>,
    /// Only kept when it is plain text
    pub description: Option<Value>,
    pub applicants: Option<OneOrMany<String>>,
    pub inventors: Option<OneOrMany<String>>,
    pub cpc: Option<OneOrMany<String>>,
    pub ipc: Option<OneOrMany<String>>,
    pub priority_numbers: Option<OneOrMany<String>>,
    pub priority_date: Option<String>,
    pub filing_date: Option<String>,
    pub publication_date: Option<String>,
    pub legal_status: Option<String>,
}

impl OfficeBRecord {
    pub fn normalize(self) -> Result<NormalizedPatentRecord, ProviderError> {
        let jurisdiction = self
            .publication_country
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "WO".to_string());
        let number = self.publication_number.map(IdValue::into_string);
        let document_number =
            require_document_number(ProviderId::OfficeB, number.as_deref(), &jurisdiction)?;

        let list = |v: Option<OneOrMany<String>>| v.map(OneOrMany::into_vec).unwrap_or_default();

        let mut record = NormalizedPatentRecord::new(ProviderId::OfficeB, document_number);
        record.jurisdiction = Some(jurisdiction);
        record.family_id = self.family_id.map(IdValue::into_string);
        record.kind_code = self.kind_code;
        record.title = self.title;
        record.abstract_text = self.abstract_text;
        record.claims = self.claims.map(ClaimsField::into_claims).unwrap_or_default();
        record.description = self
            .description
            .and_then(|d| d.as_str().map(str::to_string));
        record.applicants = list(self.applicants);
        record.inventors = list(self.inventors);

        let mut codes = list(self.cpc);
        codes.extend(list(self.ipc));
        codes.sort();
        codes.dedup();
        record.classification_codes = codes;

        record.priority_numbers = list(self.priority_numbers);
        record.filing_date = self.filing_date.as_deref().and_then(parse_date);
        record.publication_date = self.publication_date.as_deref().and_then(parse_date);
        record.priority_date = self
            .priority_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| {
                record
                    .priority_numbers
                    .iter()
                    .find_map(|p| parse_date(p))
            })
            .or(record.filing_date);
        record.legal_status = self.legal_status;

        Ok(record.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderPayload;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_normalize_with_aliases_and_single_values() {
        let item = json!({
            "DocNumber": "2020/123456",
            "familyID": "fam-77",
            "countryCode": "wo",
            "kindCode": "A1",
            "inventionTitle": "Flexizyme-mediated acylation",
            "claims": "1. A method. 2. The method of claim 1.",
            "description": {"unexpected": "object"},
            "applicants": "Ra Pharmaceuticals",
            "cpc": ["C12P21/02"],
            "ipc": "C12N",
            "priorityDate": "20150105",
            "publicationDate": "2020-06-18",
            "legalStatus": "pending"
        });

        let record = ProviderPayload::decode(ProviderId::OfficeB, item)
            .unwrap()
            .normalize()
            .unwrap();

        assert_eq!(record.document_number, "WO2020123456");
        assert_eq!(record.family_id.as_deref(), Some("FAM77"));
        assert_eq!(record.claims.len(), 2);
        assert_eq!(record.description, None);
        assert_eq!(record.applicants, vec!["Ra Pharmaceuticals"]);
        assert_eq!(record.classification_codes, vec!["C12N", "C12P21/02"]);
        assert_eq!(record.priority_date, NaiveDate::from_ymd_opt(2015, 1, 5));
        assert_eq!(record.legal_status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_missing_token_is_authentication_failure() {
        let adapter = OfficeBAdapter::new(
            &OfficeConfig::default(),
            &QueryTemplate::default(),
            ProviderCredentials::default(),
        )
        .unwrap();
        assert!(matches!(
            adapter.check_credentials(),
            Err(ProviderError::Authentication { .. })
        ));
    }

    #[test]
    fn test_parse_page_accepts_results_key() {
        let adapter = OfficeBAdapter::new(
            &OfficeConfig::default(),
            &QueryTemplate::default(),
            ProviderCredentials {
                token: Some("t".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let parsed = adapter
            .parse_page(&json!({"results": [{"publicationNumber": "WO1"}]}))
            .unwrap();
        assert_eq!(parsed.items.len(), 1);
    }
}
