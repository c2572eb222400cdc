// file: src/pipeline/orchestrator.rs
// description: coordinates the five classification stages across systems
// reference: per-system work runs concurrently, stages within a system run in order

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::{Catalog, ClassificationRecord, Part, PartStatus};
use crate::oracle::{Oracle, RetryPolicy};
use crate::pipeline::progress::{ProgressTracker, RunSummary};
use crate::pipeline::routing::{MappingDisposition, PatternOutcome, RoutingPolicy, StagePath};
use crate::pipeline::scheduler::{create_batches, group_by_system};
use crate::rules::RulesLoader;
use crate::stages::{
    BatchReport, ClassificationStage, EnrichmentCache, MappingStage, PatternMatchStage,
    ResearchStage, StageExecutor, ValidationStage, apply_cached_enrichment,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// The finished run: every input part exactly once, in input order, each
/// with a terminal status.
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<ClassificationRecord>,
    pub summary: RunSummary,
}

pub struct PipelineOrchestrator<O: Oracle> {
    config: Config,
    oracle: Arc<O>,
    catalog: Arc<Catalog>,
    rules: Arc<RulesLoader>,
    cache: Arc<EnrichmentCache>,
}

impl<O: Oracle> PipelineOrchestrator<O> {
    pub fn new(config: Config, oracle: O, catalog: Catalog) -> Result<Self> {
        if catalog.is_empty() {
            return Err(PipelineError::Config(
                "customer catalog has no entries".to_string(),
            ));
        }

        let rules = Arc::new(RulesLoader::new(config.paths.rules_dir.clone()));
        let cache = Arc::new(EnrichmentCache::load(config.paths.enrichment_cache.clone())?);

        Ok(Self {
            config,
            oracle: Arc::new(oracle),
            catalog: Arc::new(catalog),
            rules,
            cache,
        })
    }

    pub async fn run(&self, parts: Vec<Part>) -> Result<RunOutcome> {
        check_unique_part_codes(&parts)?;

        let input_order: HashMap<String, usize> = parts
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.part_code.clone(), idx))
            .collect();

        info!(
            "Starting classification of {} part(s) across catalog with {} system(s)",
            parts.len(),
            self.catalog.system_codes().len()
        );

        let progress = Arc::new(ProgressTracker::new(parts.len()));
        let mut records: Vec<ClassificationRecord> =
            parts.into_iter().map(ClassificationRecord::new).collect();

        // Stage 1 runs over all parts and must finish before any system
        // starts its downstream stages.
        let executor = StageExecutor::new(self.oracle.as_ref(), self.retry_policy());
        let stage = ClassificationStage {
            catalog: &self.catalog,
            max_tokens: self.config.oracle.max_tokens.classification,
        };
        let report = executor.run_batch(&stage, &mut records).await?;

        let groups = group_by_system(records);
        info!(
            "Classified into {} system(s), {} part(s) settled early",
            groups.system_count(),
            groups.settled.len()
        );

        let mut finished = groups.settled;
        for record in &finished {
            match record.status() {
                PartStatus::Failed => {
                    progress.inc_failed(report.failure_kind.unwrap_or("classification"))
                }
                PartStatus::NeedsReview => progress.inc_needs_review(),
                _ => {}
            }
        }

        let workers = self.config.pipeline.max_workers.max(1);
        let system_runs = groups.groups.into_iter().map(|(system, group)| {
            let progress = progress.clone();
            async move { self.process_system(system, group, progress).await }
        });

        let processed: Vec<Vec<ClassificationRecord>> = stream::iter(system_runs)
            .buffer_unordered(workers)
            .try_collect()
            .await?;

        for group in processed {
            finished.extend(group);
        }

        // Exactly-once reconciliation: nothing may end the run pending.
        for record in finished.iter_mut() {
            if !record.is_terminal() {
                warn!(
                    "Part {} reached the end of the run without a terminal status",
                    record.part.part_code
                );
                record.mark_needs_review("no terminal status at end of run");
                progress.inc_needs_review();
            }
        }

        finished.sort_by_key(|r| input_order.get(&r.part.part_code).copied().unwrap_or(usize::MAX));

        self.cache.persist()?;

        let summary = progress.summary();
        progress.finish();
        log_final_stats(&summary);

        Ok(RunOutcome {
            records: finished,
            summary,
        })
    }

    async fn process_system(
        &self,
        system: String,
        records: Vec<ClassificationRecord>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Vec<ClassificationRecord>> {
        info!("Processing system {} ({} part(s))", system, records.len());

        let executor = StageExecutor::new(self.oracle.as_ref(), self.retry_policy());
        let policy = RoutingPolicy::from(&self.config.thresholds);

        let rules_text = self.rules.load_system_rules(&system)?;
        let force_research = RulesLoader::web_search_required(&rules_text);
        let search_template = self.rules.load_search_template(&system)?;
        let examples =
            crate::data::load_validated_examples(&self.config.paths.validated_dir, &system)?;

        let mut counted_failed: HashSet<String> = HashSet::new();
        let mut done: Vec<ClassificationRecord> = Vec::new();
        let mut pattern_queue: Vec<ClassificationRecord> = Vec::new();
        let mut research_queue: Vec<ClassificationRecord> = Vec::new();
        let mut mapping_queue: Vec<ClassificationRecord> = Vec::new();
        let mut prevalidate: Vec<ClassificationRecord> = Vec::new();

        for record in records {
            if record.is_terminal() {
                done.push(record);
                continue;
            }
            match policy.after_classification(&record) {
                // An exact match skips pattern matching and research even
                // when the system's rules demand research for the rest.
                StagePath::Mapping => mapping_queue.push(record),
                StagePath::PatternMatch if force_research => research_queue.push(record),
                StagePath::PatternMatch => pattern_queue.push(record),
                StagePath::Research => research_queue.push(record),
            }
        }

        // Stage 2: pattern matching in batches.
        for mut batch in create_batches(
            std::mem::take(&mut pattern_queue),
            self.config.batching.pattern_match_batch_size,
        ) {
            let stage = PatternMatchStage {
                system_code: &system,
                rules_text: &rules_text,
                examples: &examples,
                max_tokens: self.config.oracle.max_tokens.pattern_match,
            };
            let report = executor.run_batch(&stage, &mut batch).await?;
            tally_batch_failures(&report, &batch, &mut counted_failed, &progress);

            for record in batch {
                if record.is_terminal() {
                    done.push(record);
                } else {
                    match policy.after_pattern_match(&record) {
                        PatternOutcome::Proceed => prevalidate.push(record),
                        PatternOutcome::Research => {
                            let mut record = record;
                            record.vmrs_code = None;
                            record.match_type = None;
                            research_queue.push(record);
                        }
                    }
                }
            }
        }

        // Stage 3: research one part at a time, consulting the cache first.
        for mut record in std::mem::take(&mut research_queue) {
            if let Some(cached) = self.cache.get(&record.part.part_code) {
                apply_cached_enrichment(&mut record, cached);
                progress.inc_cache_hit();
                mapping_queue.push(record);
                continue;
            }

            let query = RulesLoader::fill_template(&search_template, &record.part);
            let stage = ResearchStage {
                search_query: &query,
                cache: &self.cache,
                max_tokens: self.config.oracle.max_tokens.research,
            };
            let mut batch = vec![record];
            let report = executor.run_batch(&stage, &mut batch).await?;
            tally_batch_failures(&report, &batch, &mut counted_failed, &progress);

            for record in batch {
                if record.is_terminal() {
                    done.push(record);
                } else {
                    mapping_queue.push(record);
                }
            }
        }

        // Stage 4: mapping, one part at a time.
        for record in std::mem::take(&mut mapping_queue) {
            let stage = MappingStage {
                catalog: &self.catalog,
                system_code: &system,
                max_tokens: self.config.oracle.max_tokens.mapping,
            };
            let mut batch = vec![record];
            let report = executor.run_batch(&stage, &mut batch).await?;
            tally_batch_failures(&report, &batch, &mut counted_failed, &progress);

            for record in batch {
                if record.is_terminal() {
                    done.push(record);
                } else {
                    prevalidate.push(record);
                }
            }
        }

        // Threshold disposition before validation. A forced review survives
        // any PASS verdict in stage 5.
        for record in prevalidate.iter_mut() {
            if let MappingDisposition::ForceReview = policy.after_mapping(record.confidence) {
                record.review_forced = true;
                record.push_note(format!(
                    "confidence {} below review threshold",
                    record.confidence
                ));
            }
        }

        // Stage 5: validation in batches.
        for mut batch in create_batches(
            std::mem::take(&mut prevalidate),
            self.config.batching.validation_batch_size,
        ) {
            let stage = ValidationStage {
                catalog: &self.catalog,
                policy,
                max_tokens: self.config.oracle.max_tokens.validation,
            };
            let report = executor.run_batch(&stage, &mut batch).await?;
            tally_batch_failures(&report, &batch, &mut counted_failed, &progress);
            done.extend(batch);
        }

        for record in &done {
            match record.status() {
                PartStatus::Validated => progress.inc_validated(record.flagged),
                PartStatus::NeedsReview => progress.inc_needs_review(),
                PartStatus::Failed => {
                    if counted_failed.insert(record.part.part_code.clone()) {
                        progress.inc_failed("validation_rejected");
                    }
                }
                PartStatus::Pending => {}
            }
        }

        info!("System {} complete", system);
        Ok(done)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(self.config.retry)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

fn check_unique_part_codes(parts: &[Part]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for part in parts {
        if !seen.insert(&part.part_code) {
            return Err(PipelineError::Validation(format!(
                "duplicate part_code {} in input",
                part.part_code
            )));
        }
    }
    Ok(())
}

fn tally_batch_failures(
    report: &BatchReport,
    batch: &[ClassificationRecord],
    counted: &mut HashSet<String>,
    progress: &ProgressTracker,
) {
    let Some(kind) = report.failure_kind else {
        return;
    };
    for record in batch {
        if record.status() == PartStatus::Failed && counted.insert(record.part.part_code.clone()) {
            progress.inc_failed(kind);
        }
    }
}

fn log_final_stats(summary: &RunSummary) {
    info!("=== Classification Run Summary ===");
    info!("Duration: {} seconds", summary.duration_secs);
    info!("Parts processed: {}", summary.total_parts);
    info!("Validated: {}", summary.validated);
    info!("  of which flagged: {}", summary.flagged);
    info!("Needs review: {}", summary.needs_review);
    info!("Failed: {}", summary.failed);
    info!("Cache hits: {}", summary.cache_hits);
    info!("Success rate: {:.2}%", summary.success_rate());
    info!("Throughput: {:.2} part(s)/second", summary.parts_per_second());
    for (kind, count) in &summary.failure_kinds {
        info!("  failures [{}]: {}", kind, count);
    }
    info!("==================================");
}
