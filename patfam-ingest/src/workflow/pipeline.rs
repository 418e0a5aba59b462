//! Ingestion pipeline
//!
//! # Stages
//! 1. **Fetch**: every enabled provider and the curated file run concurrently;
//!    all of them finish before anything else starts
//! 2. **Resolve**: records are grouped into families
//! 3. **Merge**: one canonical record per family, with provider-native
//!    snippets attached
//! 4. **Tag**: taxonomy labels
//! 5. **Enrich** (optional): full-text snippets, then tags are re-evaluated
//! 6. **Persist**: upsert into the JSON Lines export (skipped in dry run and
//!    after cancellation)
//! 7. **Coverage** (optional): report against the canonical list
//!
//! # Error handling
//! Only [`IngestPipeline::from_config`] can fail, and only on configuration
//! problems. Once fetching starts every failure is folded into the
//! [`RunSummary`] counters.

use crate::config::{IngestConfig, ProviderCredentials};
use crate::enrichment::{snippets, Enricher};
use crate::fusion::{FamilyResolver, MergeEngine};
use crate::providers::{
    collect_provider, FetchOptions, ManualAdapter, OfficeAAdapter, OfficeBAdapter,
    OfficeCAdapter, ProviderAdapter, ProviderRun,
};
use crate::store::{FamilyStore, JsonlFamilyStore};
use crate::tagging::ComponentTagger;
use crate::types::{PatentFamilyRecord, ProviderId, RunSummary};
use crate::utils::RawCache;
use crate::validators::{load_canonical, CoverageReport, CoverageReporter};
use futures::future::join_all;
use patfam_common::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything one run produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub summary: RunSummary,
    /// Sorted by `family_id`
    pub families: Vec<PatentFamilyRecord>,
    pub coverage: Option<CoverageReport>,
}

pub struct IngestPipeline {
    config: IngestConfig,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    manual: Option<ManualAdapter>,
    tagger: ComponentTagger,
    enricher: Option<Enricher>,
    cancel: CancellationToken,
}

impl IngestPipeline {
    /// Validate the configuration and build the office adapters, reading
    /// credentials from the environment variables the configuration names.
    pub fn from_config(config: IngestConfig) -> Result<Self> {
        config.validate()?;

        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
        for provider in config.enabled_offices() {
            let Some(office) = config.providers.get(provider) else {
                continue;
            };
            let credentials = ProviderCredentials::from_env(provider, office);
            let adapter: Arc<dyn ProviderAdapter> = match provider {
                ProviderId::OfficeA => Arc::new(OfficeAAdapter::new(office, &config.query, credentials)?),
                ProviderId::OfficeB => Arc::new(OfficeBAdapter::new(office, &config.query, credentials)?),
                ProviderId::OfficeC => Arc::new(OfficeCAdapter::new(office, &config.query, credentials)?),
                ProviderId::Manual => continue,
            };
            adapters.push(adapter);
        }

        Self::with_adapters(config, adapters)
    }

    /// Build around caller-supplied adapters
    pub fn with_adapters(config: IngestConfig, adapters: Vec<Arc<dyn ProviderAdapter>>) -> Result<Self> {
        let tagger = ComponentTagger::new(&config.taxonomy)?;
        let enricher = match Enricher::from_config(&config.enrichment) {
            Ok(enricher) => enricher,
            Err(e) => {
                warn!(error = %e, "Enrichment disabled");
                None
            }
        };
        let manual = config.run.manual_path.as_ref().map(ManualAdapter::new);

        Ok(Self {
            config,
            adapters,
            manual,
            tagger,
            enricher,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the run before the next page of every provider
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub async fn run(&self) -> PipelineOutput {
        let run = &self.config.run;
        let mut summary = RunSummary::new(run.dry_run);
        info!(
            run_id = %summary.run_id,
            providers = ?self.adapters.iter().map(|a| a.provider_id()).collect::<Vec<_>>(),
            manual = self.manual.is_some(),
            dry_run = run.dry_run,
            "Ingestion run started"
        );

        // Fetch (synchronization barrier)
        let options = FetchOptions {
            max_pages: run.max_pages,
            per_page: run.per_page,
            save_raw: run.save_raw,
            dry_run: run.dry_run,
            cache: RawCache::new(&run.cache_dir),
            retry: self.config.retry.policy(),
            cancel: self.cancel.clone(),
        };
        let office_runs = join_all(
            self.adapters
                .iter()
                .map(|adapter| collect_provider(Arc::clone(adapter), options.clone())),
        );
        let manual_run = async {
            match &self.manual {
                Some(manual) => Some(manual.collect().await),
                None => None,
            }
        };
        let (office_runs, manual_run) = tokio::join!(office_runs, manual_run);

        let mut records = Vec::new();
        for ProviderRun { provider, records: provider_records, outcome } in
            office_runs.into_iter().chain(manual_run)
        {
            if provider == ProviderId::Manual {
                summary.manual_skipped_lines = outcome.malformed_records;
            }
            records.extend(provider_records);
            summary.providers.insert(provider, outcome);
        }
        summary.record_count = records.len();
        summary.cancelled = self.cancel.is_cancelled();

        // Resolve and merge
        let priority = self.config.provider_priority();
        let resolution = FamilyResolver::new(&self.config.resolver, priority.clone()).resolve(records);
        summary.family_count = resolution.families.len();
        summary.synthesized_family_ids = resolution.synthesized;
        summary.similarity_merges = resolution.similarity_merges;

        let mut families = MergeEngine::new(priority).merge_all(&resolution.families);
        for family in families.iter_mut() {
            snippets::attach_native(family);
        }
        summary.merge_conflicts = families.iter().map(PatentFamilyRecord::conflict_count).sum();

        // Tag, enrich, re-tag
        summary.tagged_families = self.tagger.tag_all(&mut families);
        if let Some(enricher) = &self.enricher {
            if summary.cancelled {
                info!("Run cancelled, enrichment skipped");
            } else {
                let (added, unavailable) = enricher.enrich_all(&mut families).await;
                summary.snippets_added = added;
                summary.enrichment_unavailable = unavailable;
                summary.tagged_families = self.tagger.tag_all(&mut families);
            }
        }

        // Persist
        if run.dry_run {
            info!(families = families.len(), "Dry run, family export not written");
        } else if summary.cancelled {
            warn!("Run cancelled, family export not written");
        } else {
            match self.persist(&families) {
                Ok(count) => summary.families_persisted = count,
                Err(e) => {
                    error!(path = %run.output_path.display(), error = %e, "Family export failed");
                    summary.persistence_error = Some(e.to_string());
                }
            }
        }

        let coverage = self.coverage(&families);

        summary.finish();
        info!(
            run_id = %summary.run_id,
            records = summary.record_count,
            families = summary.family_count,
            synthesized = summary.synthesized_family_ids,
            merge_conflicts = summary.merge_conflicts,
            tagged = summary.tagged_families,
            persisted = summary.families_persisted,
            complete = summary.complete,
            cancelled = summary.cancelled,
            "Ingestion run finished"
        );

        PipelineOutput {
            summary,
            families,
            coverage,
        }
    }

    /// Upsert into the export; returns the number of families written this run
    fn persist(&self, families: &[PatentFamilyRecord]) -> Result<usize> {
        let mut store = JsonlFamilyStore::open(&self.config.run.output_path)?;
        for family in families {
            store.upsert(family.clone());
        }
        store.flush()?;
        Ok(families.len())
    }

    fn coverage(&self, families: &[PatentFamilyRecord]) -> Option<CoverageReport> {
        let path = self.config.run.canonical_path.as_ref()?;
        let entries = match load_canonical(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Coverage report skipped");
                return None;
            }
        };
        let report = CoverageReporter::new(families).report(&entries);

        if let Some(output) = &self.config.run.coverage_output {
            if self.config.run.dry_run {
                info!("Dry run, coverage report not written");
            } else if let Err(e) = report.write(output) {
                warn!(path = %output.display(), error = %e, "Coverage report not written");
            }
        }
        Some(report)
    }
}
