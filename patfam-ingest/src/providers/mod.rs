//! Provider adapters
//!
//! Every office adapter implements [`ProviderAdapter`]: it knows how to fetch
//! one page and where the items sit in the response. Pagination, the raw
//! cache, retries, cancellation and normalization are shared by
//! [`fetch_records`], so adapters stay small and behave identically.
//!
//! Adapter errors never escape a provider: [`collect_provider`] folds them
//! into a [`ProviderOutcome`] so sibling providers keep running.

use crate::config::OfficeConfig;
use crate::error::ProviderError;
use crate::types::{NormalizedPatentRecord, ProviderId, ProviderOutcome, RawProviderRecord};
use crate::utils::{retry_transient, RawCache, RetryPolicy};
use async_trait::async_trait;
use chrono::Utc;
use futures::{Stream, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod manual;
pub mod office_a;
pub mod office_b;
pub mod office_c;
pub mod payload;
pub mod query;

pub use manual::{ManualAdapter, ManualLoad};
pub use office_a::OfficeAAdapter;
pub use office_b::OfficeBAdapter;
pub use office_c::OfficeCAdapter;
pub use payload::ProviderPayload;

/// Items found in one response page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub items: Vec<Value>,
    /// Total hits reported by the provider, when it reports one
    pub total: Option<u64>,
}

/// Paginated office provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    /// Rendered query, used as the raw cache key
    fn query_key(&self) -> String;

    /// Fail fast when required credentials are absent
    fn check_credentials(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Fetch one page (0-based) of raw results
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Value, ProviderError>;

    /// Locate the result items in a raw page
    fn parse_page(&self, payload: &Value) -> Result<ParsedPage, ProviderError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP plumbing shared by the office adapters
pub struct HttpContext {
    provider: ProviderId,
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Option<DirectLimiter>,
}

impl HttpContext {
    pub fn new(
        provider: ProviderId,
        config: &OfficeConfig,
        default_url: &str,
    ) -> patfam_common::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("patfam/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                patfam_common::Error::Config(format!("{}: cannot build HTTP client: {}", provider, e))
            })?;

        let rate_limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            provider,
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            rate_limiter,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode a JSON body, classifying failures
    pub async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(ProviderError::from_status(
                self.provider,
                status.as_u16(),
                format!("HTTP {}: {}", status, snippet),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.provider, e))
    }
}

/// Per-run fetch parameters shared by all adapters
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_pages: u32,
    pub per_page: u32,
    /// Read cached pages and write fetched ones
    pub save_raw: bool,
    /// Suppress cache writes
    pub dry_run: bool,
    pub cache: RawCache,
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

/// Progress events of one provider's fetch
#[derive(Debug)]
pub enum FetchEvent {
    Record(NormalizedPatentRecord),
    /// Item that could not be decoded or normalized
    Malformed(ProviderError),
    /// Page given up after retries or rejected by the provider
    PageSkipped { page: u32, error: ProviderError },
    PageDone { page: u32, from_cache: bool, items: usize },
    /// Provider stopped (authentication failure, cancellation)
    Stopped(ProviderError),
}

/// Lazy, finite sequence of records from one provider starting at `start_page`.
///
/// Pagination ends on an empty or short page, once the reported total is
/// reached, or at `max_pages`.
pub fn fetch_records(
    adapter: Arc<dyn ProviderAdapter>,
    options: FetchOptions,
    start_page: u32,
) -> impl Stream<Item = FetchEvent> {
    async_stream::stream! {
        let provider = adapter.provider_id();

        if let Err(err) = adapter.check_credentials() {
            yield FetchEvent::Stopped(err);
            return;
        }

        let query = adapter.query_key();
        let mut seen: u64 = u64::from(start_page) * u64::from(options.per_page);

        for page in start_page..options.max_pages {
            if options.cancel.is_cancelled() {
                yield FetchEvent::Stopped(ProviderError::Cancelled(provider));
                return;
            }

            let cached = if options.save_raw {
                options.cache.load(provider, &query, page)
            } else {
                None
            };
            let from_cache = cached.is_some();

            let payload = match cached {
                Some(raw) => raw.payload,
                None => {
                    let fetched = retry_transient(
                        provider,
                        "fetch_page",
                        &options.retry,
                        &options.cancel,
                        || adapter.fetch_page(page, options.per_page),
                    )
                    .await;

                    match fetched {
                        Ok(payload) => {
                            if options.save_raw && !options.dry_run {
                                let raw = RawProviderRecord {
                                    provider_id: provider,
                                    fetched_at: Utc::now(),
                                    query: query.clone(),
                                    page,
                                    payload,
                                };
                                if let Err(e) = options.cache.store(&raw) {
                                    warn!(provider = %provider, page, error = %e, "Raw page not cached");
                                }
                                raw.payload
                            } else {
                                payload
                            }
                        }
                        Err(err @ (ProviderError::Authentication { .. } | ProviderError::Cancelled(_))) => {
                            yield FetchEvent::Stopped(err);
                            return;
                        }
                        Err(err) => {
                            yield FetchEvent::PageSkipped { page, error: err };
                            continue;
                        }
                    }
                }
            };

            let parsed = match adapter.parse_page(&payload) {
                Ok(parsed) => parsed,
                Err(err) => {
                    yield FetchEvent::PageSkipped { page, error: err };
                    continue;
                }
            };

            let items = parsed.items.len();
            for item in parsed.items {
                match ProviderPayload::decode(provider, item).and_then(ProviderPayload::normalize) {
                    Ok(record) => yield FetchEvent::Record(record),
                    Err(err) => yield FetchEvent::Malformed(err),
                }
            }
            yield FetchEvent::PageDone { page, from_cache, items };

            seen += items as u64;
            let total_reached = parsed.total.is_some_and(|total| seen >= total);
            if items == 0 || items < options.per_page as usize || total_reached {
                debug!(provider = %provider, page, items, "Last page reached");
                break;
            }
        }
    }
}

/// Records and outcome of one provider
#[derive(Debug)]
pub struct ProviderRun {
    pub provider: ProviderId,
    pub records: Vec<NormalizedPatentRecord>,
    pub outcome: ProviderOutcome,
}

/// Drain one adapter's stream into records and counters
pub async fn collect_provider(adapter: Arc<dyn ProviderAdapter>, options: FetchOptions) -> ProviderRun {
    let provider = adapter.provider_id();
    let mut outcome = ProviderOutcome::default();
    let mut records = Vec::new();

    info!(provider = %provider, max_pages = options.max_pages, per_page = options.per_page, "Provider fetch started");

    let stream = fetch_records(adapter, options, 0);
    futures::pin_mut!(stream);

    while let Some(event) = stream.next().await {
        match event {
            FetchEvent::Record(record) => records.push(record),
            FetchEvent::Malformed(err) => {
                outcome.malformed_records += 1;
                warn!(provider = %provider, malformed_records = outcome.malformed_records, error = %err, "Malformed record skipped");
            }
            FetchEvent::PageSkipped { page, error } => {
                outcome.pages_skipped += 1;
                warn!(provider = %provider, page, pages_skipped = outcome.pages_skipped, error = %error, "Page skipped, partial coverage");
            }
            FetchEvent::PageDone { from_cache, .. } => {
                if from_cache {
                    outcome.pages_from_cache += 1;
                } else {
                    outcome.pages_fetched += 1;
                }
            }
            FetchEvent::Stopped(err) => match err {
                ProviderError::Authentication { .. } => {
                    warn!(provider = %provider, error = %err, "Provider skipped: authentication failure");
                    outcome.authentication_failure = Some(err.to_string());
                }
                other => {
                    warn!(provider = %provider, error = %other, "Provider stopped");
                    outcome.error = Some(other.to_string());
                }
            },
        }
    }

    outcome.records = records.len();
    info!(
        provider = %provider,
        records = outcome.records,
        pages_fetched = outcome.pages_fetched,
        pages_from_cache = outcome.pages_from_cache,
        pages_skipped = outcome.pages_skipped,
        "Provider fetch finished"
    );

    ProviderRun {
        provider,
        records,
        outcome,
    }
}
