//! Run configuration for patfam-ingest
//!
//! Loaded from TOML (see [`patfam_common::config::resolve_config_path`] for
//! the lookup order), overridden by CLI flags, and validated before any
//! provider is contacted. Validation failures are the only errors allowed to
//! abort a run.

use crate::types::{ProviderId, ProviderPriority};
use crate::utils::retry::RetryPolicy;
use patfam_common::config::{load_toml, ConfigSource, LoggingConfig};
use patfam_common::{Error, Result};
use regex::RegexBuilder;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub run: RunConfig,
    pub query: QueryTemplate,
    pub providers: ProvidersConfig,
    pub retry: RetryConfig,
    pub resolver: ResolverConfig,
    pub enrichment: EnrichmentConfig,
    pub taxonomy: Vec<ComponentRule>,
    pub logging: LoggingConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            query: QueryTemplate::default(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            resolver: ResolverConfig::default(),
            enrichment: EnrichmentConfig::default(),
            taxonomy: default_taxonomy(),
            logging: LoggingConfig::default(),
        }
    }
}

/// `[run]` global run parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_pages: u32,
    pub per_page: u32,
    pub save_raw: bool,
    pub dry_run: bool,
    pub cache_dir: PathBuf,
    /// Family export (JSON Lines)
    pub output_path: PathBuf,
    pub provider_priority: Vec<ProviderId>,
    /// Curated JSONL supplement
    pub manual_path: Option<PathBuf>,
    /// Canonical reference list for the coverage pass
    pub canonical_path: Option<PathBuf>,
    pub coverage_output: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            per_page: 100,
            save_raw: false,
            dry_run: false,
            cache_dir: PathBuf::from("data/raw/mrna_display"),
            output_path: PathBuf::from("data/families.jsonl"),
            provider_priority: ProviderId::ALL.to_vec(),
            manual_path: None,
            canonical_path: None,
            coverage_output: None,
        }
    }
}

/// `[query]` search template shared by all office providers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryTemplate {
    pub keywords: Vec<String>,
    pub synonyms: Vec<String>,
    pub cpc_prefixes: Vec<String>,
    pub ipc_prefixes: Vec<String>,
    pub applicants: Vec<String>,
    pub exclude_applicants: Vec<String>,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            keywords: list(&[
                "\"mRNA display\"",
                "\"messenger RNA display\"",
                "\"displayed mRNA-peptide fusion\"",
            ]),
            synonyms: list(&[
                "\"ribosome display\"",
                "\"flexizyme\"",
                "\"mRNA-peptide fusion\"",
                "\"RaPID platform\"",
            ]),
            cpc_prefixes: list(&["C07K", "C12N", "C12P", "G01N"]),
            ipc_prefixes: list(&["C12N", "G01N"]),
            applicants: list(&[
                "Moderna",
                "Ra Pharmaceuticals",
                "PeptiDream",
                "Hoffmann-La Roche",
                "Chugai Pharmaceutical",
            ]),
            exclude_applicants: Vec::new(),
        }
    }
}

impl QueryTemplate {
    /// Keywords then synonyms, surrounding quotes stripped, de-duplicated
    pub fn phrases(&self) -> Vec<String> {
        dedup_preserving_order(
            self.keywords
                .iter()
                .chain(self.synonyms.iter())
                .map(|p| p.trim().trim_matches('"').to_string()),
        )
    }

    /// Copy with every list de-duplicated (order kept)
    pub fn deduplicated(&self) -> Self {
        let d = |v: &[String]| dedup_preserving_order(v.iter().map(|s| s.trim().to_string()));
        Self {
            keywords: d(&self.keywords),
            synonyms: d(&self.synonyms),
            cpc_prefixes: d(&self.cpc_prefixes),
            ipc_prefixes: d(&self.ipc_prefixes),
            applicants: d(&self.applicants),
            exclude_applicants: d(&self.exclude_applicants),
        }
    }

    /// Apply a per-provider override table
    pub fn with_override(&self, over: Option<&QueryOverride>) -> Self {
        let Some(over) = over else {
            return self.deduplicated();
        };
        let pick = |o: &Option<Vec<String>>, base: &Vec<String>| o.clone().unwrap_or_else(|| base.clone());
        Self {
            keywords: pick(&over.keywords, &self.keywords),
            synonyms: pick(&over.synonyms, &self.synonyms),
            cpc_prefixes: pick(&over.cpc_prefixes, &self.cpc_prefixes),
            ipc_prefixes: pick(&over.ipc_prefixes, &self.ipc_prefixes),
            applicants: pick(&over.applicants, &self.applicants),
            exclude_applicants: pick(&over.exclude_applicants, &self.exclude_applicants),
        }
        .deduplicated()
    }
}

fn dedup_preserving_order<I: Iterator<Item = String>>(items: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items.filter(|s| !s.is_empty()) {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// `[providers.<id>.query]` per-provider overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryOverride {
    pub keywords: Option<Vec<String>>,
    pub synonyms: Option<Vec<String>>,
    pub cpc_prefixes: Option<Vec<String>>,
    pub ipc_prefixes: Option<Vec<String>>,
    pub applicants: Option<Vec<String>>,
    pub exclude_applicants: Option<Vec<String>>,
}

/// `[providers]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub office_a: OfficeConfig,
    pub office_b: OfficeConfig,
    pub office_c: OfficeConfig,
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderId) -> Option<&OfficeConfig> {
        match provider {
            ProviderId::OfficeA => Some(&self.office_a),
            ProviderId::OfficeB => Some(&self.office_b),
            ProviderId::OfficeC => Some(&self.office_c),
            ProviderId::Manual => None,
        }
    }
}

/// One office provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfficeConfig {
    pub enabled: bool,
    /// Overrides the public endpoint (tests point this at a mock server)
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub token_env: Option<String>,
    pub key_env: Option<String>,
    pub secret_env: Option<String>,
    pub requests_per_second: Option<u32>,
    pub timeout_secs: u64,
    pub query: Option<QueryOverride>,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            api_key_env: None,
            token_env: None,
            key_env: None,
            secret_env: None,
            requests_per_second: None,
            timeout_secs: 60,
            query: None,
        }
    }
}

impl OfficeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Credentials for one provider, read once from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub token: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
}

impl ProviderCredentials {
    /// Resolve credentials from the process environment
    pub fn from_env(provider: ProviderId, config: &OfficeConfig) -> Self {
        Self::resolve(provider, config, |name| std::env::var(name).ok())
    }

    /// Resolve credentials through a variable lookup function
    ///
    /// Unset variable names fall back to the provider's conventional ones.
    pub fn resolve<F>(provider: ProviderId, config: &OfficeConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |configured: &Option<String>, fallback: &str| {
            let name = configured.as_deref().unwrap_or(fallback);
            let value = lookup(name).filter(|v| is_valid_key(v));
            if value.is_some() {
                debug!(provider = %provider, variable = name, "Credential loaded from environment");
            }
            value
        };

        match provider {
            ProviderId::OfficeA => Self {
                api_key: read(&config.api_key_env, "PATENTSVIEW_API_KEY"),
                ..Default::default()
            },
            ProviderId::OfficeB => Self {
                token: read(&config.token_env, "WIPO_PATENTSCOPE_TOKEN"),
                ..Default::default()
            },
            ProviderId::OfficeC => Self {
                key: read(&config.key_env, "EPO_OPS_KEY"),
                secret: read(&config.secret_env, "EPO_OPS_SECRET"),
                ..Default::default()
            },
            ProviderId::Manual => Self::default(),
        }
    }
}

/// Credential values must be non-empty and non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// `[retry]` backoff policy for page fetches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// `[resolver]` family similarity fallback
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum normalized Levenshtein similarity of sorted title tokens (0.0-1.0)
    pub title_similarity_threshold: f64,
    /// Only compare records with identical priority dates
    pub require_priority_date_match: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.85,
            require_priority_date_match: true,
        }
    }
}

/// `[enrichment]` full-text sources
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub local_dir: Option<PathBuf>,
    pub scrape: bool,
    pub scrape_base_url: String,
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            local_dir: None,
            scrape: false,
            scrape_base_url: "https://patents.google.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// `[[taxonomy]]` component rule
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentRule {
    pub label: String,
    /// Case-insensitive regular expressions
    pub patterns: Vec<String>,
    /// Classification code prefixes, at least one of which must be present
    #[serde(default)]
    pub required_codes: Vec<String>,
    /// Classification code prefixes that veto the label
    #[serde(default)]
    pub excluded_codes: Vec<String>,
}

impl ComponentRule {
    pub fn new(label: &str, patterns: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            required_codes: Vec::new(),
            excluded_codes: Vec::new(),
        }
    }
}

/// Built-in mRNA-display component taxonomy
pub fn default_taxonomy() -> Vec<ComponentRule> {
    vec![
        ComponentRule::new("n-methylation", &[r"\bn-?methyl"]),
        ComponentRule::new(
            "non-canonical-amino-acid",
            &[
                r"\bnon[-\s]?canonical amino",
                r"\bunnatural amino",
                r"\bnon[-\s]?proteinogenic amino",
            ],
        ),
        ComponentRule::new(
            "cyclization",
            &[r"\bcycli[sz]ation", r"\bcyclic peptide", r"\bmacrocycl"],
        ),
        ComponentRule::new("flexizyme", &[r"\bflexizyme"]),
        ComponentRule::new("rapid-platform", &[r"\brapid platform"]),
        ComponentRule::new(
            "mrna-display",
            &[r"\bmrna[-\s]display", r"\bmrna[-\s]peptide fusion"],
        ),
    ]
}

/// Command-line overrides applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub max_pages: Option<u32>,
    pub per_page: Option<u32>,
    pub save_raw: bool,
    pub dry_run: bool,
    pub manual_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub full_text_dir: Option<PathBuf>,
    pub canonical_path: Option<PathBuf>,
    pub coverage_output: Option<PathBuf>,
}

impl IngestConfig {
    /// Load from a resolved source; built-in defaults when there is no file
    pub fn load(source: &ConfigSource) -> Result<Self> {
        match source.path() {
            Some(path) => {
                info!(path = %path.display(), "Loading run configuration");
                load_toml(path)
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: RunOverrides) {
        if let Some(max_pages) = overrides.max_pages {
            self.run.max_pages = max_pages;
        }
        if let Some(per_page) = overrides.per_page {
            self.run.per_page = per_page;
        }
        self.run.save_raw |= overrides.save_raw;
        self.run.dry_run |= overrides.dry_run;
        if overrides.manual_path.is_some() {
            self.run.manual_path = overrides.manual_path;
        }
        if let Some(output) = overrides.output_path {
            self.run.output_path = output;
        }
        if let Some(dir) = overrides.full_text_dir {
            self.enrichment.enabled = true;
            self.enrichment.local_dir = Some(dir);
        }
        if overrides.canonical_path.is_some() {
            self.run.canonical_path = overrides.canonical_path;
        }
        if overrides.coverage_output.is_some() {
            self.run.coverage_output = overrides.coverage_output;
        }
    }

    /// Office providers switched on in this configuration
    pub fn enabled_offices(&self) -> Vec<ProviderId> {
        [ProviderId::OfficeA, ProviderId::OfficeB, ProviderId::OfficeC]
            .into_iter()
            .filter(|p| self.providers.get(*p).is_some_and(|c| c.enabled))
            .collect()
    }

    pub fn provider_priority(&self) -> ProviderPriority {
        ProviderPriority::new(&self.run.provider_priority)
    }

    /// Check everything that would otherwise fail mid-run
    pub fn validate(&self) -> Result<()> {
        if self.enabled_offices().is_empty() && self.run.manual_path.is_none() {
            return Err(Error::Config(
                "No provider enabled and no manual file given".to_string(),
            ));
        }
        for (name, path) in [
            ("manual file", &self.run.manual_path),
            ("canonical list", &self.run.canonical_path),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(Error::Config(format!("{} {} not found", name, path.display())));
                }
            }
        }
        if self.run.max_pages == 0 {
            return Err(Error::Config("run.max_pages must be at least 1".to_string()));
        }
        if self.run.per_page == 0 {
            return Err(Error::Config("run.per_page must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        let threshold = self.resolver.title_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "resolver.title_similarity_threshold must be within 0..=1 (got {})",
                threshold
            )));
        }
        for rule in &self.taxonomy {
            if rule.label.trim().is_empty() {
                return Err(Error::Config("taxonomy rule with empty label".to_string()));
            }
            if rule.patterns.is_empty() {
                return Err(Error::Config(format!(
                    "taxonomy rule '{}' has no patterns",
                    rule.label
                )));
            }
            for pattern in &rule.patterns {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        Error::Config(format!(
                            "taxonomy rule '{}': invalid pattern {:?}: {}",
                            rule.label, pattern, e
                        ))
                    })?;
            }
        }
        Ok(())
    }
}
