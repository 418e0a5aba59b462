//! Office adapters against mock HTTP servers

use patfam_ingest::config::{OfficeConfig, ProviderCredentials, QueryTemplate};
use patfam_ingest::providers::{
    collect_provider, FetchOptions, OfficeAAdapter, OfficeBAdapter, OfficeCAdapter,
    ProviderAdapter,
};
use patfam_ingest::types::ProviderId;
use patfam_ingest::utils::{RawCache, RetryPolicy};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn office(server: &MockServer, route: &str) -> OfficeConfig {
    OfficeConfig {
        base_url: Some(format!("{}{}", server.uri(), route)),
        timeout_secs: 5,
        ..OfficeConfig::default()
    }
}

fn options(dir: &TempDir, per_page: u32) -> FetchOptions {
    FetchOptions {
        max_pages: 5,
        per_page,
        save_raw: false,
        dry_run: false,
        cache: RawCache::new(dir.path()),
        retry: RetryPolicy::immediate(3),
        cancel: CancellationToken::new(),
    }
}

fn patentsview_item(number: &str) -> serde_json::Value {
    json!({
        "patent_number": number,
        "patent_title": "mRNA display of cyclic peptides",
        "patent_family_id": format!("F{}", number),
    })
}

#[tokio::test]
async fn test_office_a_paginates_until_total() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({"o": {"page": 1}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patents": [patentsview_item("9000001"), patentsview_item("9000002")],
            "total_patent_count": 3,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({"o": {"page": 2}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patents": [patentsview_item("9000003")],
            "total_patent_count": 3,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OfficeAAdapter::new(
        &office(&server, "/query"),
        &QueryTemplate::default(),
        ProviderCredentials::default(),
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 2)).await;

    assert_eq!(run.provider, ProviderId::OfficeA);
    assert_eq!(run.records.len(), 3);
    assert_eq!(run.outcome.pages_fetched, 2);
    assert_eq!(run.records[0].document_number, "US9000001");
}

#[tokio::test]
async fn test_office_a_retries_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patents": [patentsview_item("9000001")],
        })))
        .mount(&server)
        .await;

    let adapter = OfficeAAdapter::new(
        &office(&server, "/query"),
        &QueryTemplate::default(),
        ProviderCredentials::default(),
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 10)).await;

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.outcome.pages_skipped, 0);
    assert!(!run.outcome.is_degraded());
}

#[tokio::test]
async fn test_office_a_skips_page_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let adapter = OfficeAAdapter::new(
        &office(&server, "/query"),
        &QueryTemplate::default(),
        ProviderCredentials::default(),
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, 10);
    opts.max_pages = 1;
    let run = collect_provider(Arc::new(adapter), opts).await;

    assert!(run.records.is_empty());
    assert_eq!(run.outcome.pages_skipped, 1);
    assert!(run.outcome.authentication_failure.is_none());
}

#[tokio::test]
async fn test_office_b_rejected_token_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = ProviderCredentials {
        token: Some("expired".to_string()),
        ..Default::default()
    };
    let adapter = OfficeBAdapter::new(&office(&server, "/search"), &QueryTemplate::default(), credentials)
        .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 10)).await;

    assert!(run.records.is_empty());
    assert!(run.outcome.authentication_failure.is_some());
    assert_eq!(run.outcome.pages_skipped, 0);
}

#[tokio::test]
async fn test_office_b_missing_token_never_calls_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = OfficeBAdapter::new(
        &office(&server, "/search"),
        &QueryTemplate::default(),
        ProviderCredentials::default(),
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 10)).await;

    assert!(run.outcome.authentication_failure.is_some());
}

#[tokio::test]
async fn test_office_b_start_offset_and_cache_reuse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("start", "0"))
        .and(query_param("rows", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"publicationNumber": "WO2019111111", "familyId": "77"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = ProviderCredentials {
        token: Some("valid".to_string()),
        ..Default::default()
    };
    let adapter: Arc<dyn ProviderAdapter> = Arc::new(
        OfficeBAdapter::new(&office(&server, "/search"), &QueryTemplate::default(), credentials).unwrap(),
    );
    let dir = TempDir::new().unwrap();
    let mut opts = options(&dir, 10);
    opts.save_raw = true;

    let first = collect_provider(Arc::clone(&adapter), opts.clone()).await;
    assert_eq!(first.outcome.pages_fetched, 1);

    let second = collect_provider(adapter, opts).await;
    assert_eq!(second.outcome.pages_from_cache, 1);
    assert_eq!(second.outcome.pages_fetched, 0);
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].family_id.as_deref(), Some("77"));
}

fn ops_document(number: &str) -> serde_json::Value {
    json!({
        "document": {
            "@family-id": format!("9{}", number),
            "bibliographic-data": {
                "publication-reference": {
                    "document-id": {"doc-number": {"$": number}, "country": "EP", "kind": "A1"}
                },
                "invention-title": {"@lang": "en", "$": "Macrocyclic peptide selection"}
            }
        }
    })
}

fn ops_page(results: serde_json::Value, total: &str) -> serde_json::Value {
    json!({
        "ops:world-patent-data": {
            "ops:biblio-search": {"@total-result-count": total},
            "ops:search-response": {"ops:result": results}
        }
    })
}

fn ops_credentials() -> ProviderCredentials {
    ProviderCredentials {
        key: Some("ops-key".to_string()),
        secret: Some("ops-secret".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_office_c_range_pagination_with_basic_auth() {
    let server = MockServer::start().await;
    // base64("ops-key:ops-secret")
    let auth = "Basic b3BzLWtleTpvcHMtc2VjcmV0";
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("Range", "0-1"))
        .and(header("authorization", auth))
        .respond_with(ResponseTemplate::new(200).set_body_json(ops_page(
            json!([ops_document("3000001"), ops_document("3000002")]),
            "3",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("Range", "2-3"))
        .and(header("authorization", auth))
        .respond_with(ResponseTemplate::new(200).set_body_json(ops_page(ops_document("3000003"), "3")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OfficeCAdapter::new(&office(&server, "/search"), &QueryTemplate::default(), ops_credentials())
        .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 2)).await;

    assert_eq!(run.provider, ProviderId::OfficeC);
    assert_eq!(run.outcome.pages_fetched, 2);
    let docs: Vec<&str> = run.records.iter().map(|r| r.document_number.as_str()).collect();
    assert_eq!(docs, vec!["EP3000001", "EP3000002", "EP3000003"]);
    assert!(!run.outcome.is_degraded());
}

#[tokio::test]
async fn test_office_c_stops_at_reported_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Range", "0-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ops_page(
            json!([ops_document("3000001"), ops_document("3000002")]),
            "2",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("Range", "2-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ops_page(json!([]), "2")))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = OfficeCAdapter::new(&office(&server, "/search"), &QueryTemplate::default(), ops_credentials())
        .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 2)).await;

    assert_eq!(run.records.len(), 2);
    assert_eq!(run.outcome.pages_fetched, 1);
}

#[tokio::test]
async fn test_office_c_rejected_credentials_are_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid client"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OfficeCAdapter::new(&office(&server, "/search"), &QueryTemplate::default(), ops_credentials())
        .unwrap();
    let dir = TempDir::new().unwrap();
    let run = collect_provider(Arc::new(adapter), options(&dir, 10)).await;

    assert!(run.records.is_empty());
    assert!(run.outcome.authentication_failure.is_some());
    assert_eq!(run.outcome.pages_skipped, 0);
}
