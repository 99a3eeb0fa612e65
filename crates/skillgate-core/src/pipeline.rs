//! End-to-end orchestration for one topic.
//!
//! dedup → gap analysis → collect → generate → ladder → route → (repair →
//! route) → side effects → persist. Every collaborator call is bounded by a
//! timeout; failures become stage notes and the run carries on with what it
//! has. The orchestrator only branches on enum statuses.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn, Instrument};

use crate::collaborators::{ContentGenerator, PublishRequest, PublishTarget, SkillCatalog, SourceCollector};
use crate::config::PipelineConfig;
use crate::dedup::{standard_sources, CompetitorSource, DedupResolver, GapAnalysis, GapAnalyzer};
use crate::document::{slugify, REQUIRED_OPENING_MARKER};
use crate::domain::{
    DedupAction, DedupDecision, FinalStatus, PipelineReport, Result, SkillgateError, Stage,
    StageStatus,
};
use crate::ladder::ValidationLadder;
use crate::levels::{LookupCache, PackageIndex};
use crate::obs;
use crate::prompt::{generation_prompt, source_breakdown, template_document, GenerationBrief};
use crate::repair::{RepairLoop, RepairPolicy};
use crate::router::{PublishAction, PublishRouter, RepairResult, Route};
use crate::sandbox::{CodeRunner, ErrorClassifier};
use crate::score::Aggregate;
use crate::store::{status_counts, ReportStore, ReportSummary};

/// Length of the hex trace id attached to every run.
pub const TRACE_ID_LEN: usize = 12;

/// Short hex id derived from the topic and the current instant.
pub fn new_trace_id(topic: &str) -> String {
    let seed = format!("{topic}{}", Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true));
    let mut id = hex::encode(Sha256::digest(seed.as_bytes()));
    id.truncate(TRACE_ID_LEN);
    id
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub collector: Arc<dyn SourceCollector>,
    /// Generation and repair are available only when this is set.
    pub generator: Option<Arc<dyn ContentGenerator>>,
    pub publisher: Arc<dyn PublishTarget>,
    pub catalog: Arc<dyn SkillCatalog>,
    pub index: Arc<dyn PackageIndex>,
    pub runner: Arc<dyn CodeRunner>,
}

/// Per-topic results of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
    pub runs: Vec<ReportSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_topics: Vec<String>,
}

pub struct SkillPipeline {
    config: PipelineConfig,
    collector: Arc<dyn SourceCollector>,
    generator: Option<Arc<dyn ContentGenerator>>,
    publisher: Arc<dyn PublishTarget>,
    catalog: Arc<dyn SkillCatalog>,
    lookup_cache: Arc<LookupCache>,
    ladder: ValidationLadder,
    router: PublishRouter,
    dedup: DedupResolver,
    gaps: GapAnalyzer,
    repair: RepairLoop,
    store: ReportStore,
}

impl SkillPipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let timeout = config.collaborator_timeout();
        let lookup_cache = Arc::new(LookupCache::new(Duration::from_secs(
            config.index_cache_ttl_secs,
        )));

        Ok(Self {
            ladder: ValidationLadder::new(
                &config,
                collaborators.runner,
                collaborators.index,
                lookup_cache.clone(),
                ErrorClassifier::standard(),
            ),
            router: PublishRouter::new(config.publish_threshold),
            dedup: Self::build_dedup(&config, collaborators.catalog.clone(), standard_sources()),
            gaps: GapAnalyzer::new(collaborators.catalog.clone(), timeout),
            repair: RepairLoop::new(
                collaborators.generator.clone(),
                RepairPolicy {
                    note_limit: config.repair_note_limit,
                    ..RepairPolicy::default()
                },
                timeout,
            ),
            store: ReportStore::from_config(&config),
            collector: collaborators.collector,
            generator: collaborators.generator,
            publisher: collaborators.publisher,
            catalog: collaborators.catalog,
            lookup_cache,
            config,
        })
    }

    fn build_dedup(
        config: &PipelineConfig,
        catalog: Arc<dyn SkillCatalog>,
        sources: Vec<CompetitorSource>,
    ) -> DedupResolver {
        DedupResolver::new(
            catalog,
            sources,
            config.skills_dir.clone(),
            Duration::from_secs(config.own_catalog_ttl_secs),
            Duration::from_secs(config.competitor_catalog_ttl_secs),
            config.collaborator_timeout(),
        )
    }

    /// Replace the competitor catalogs checked by the dedup gate.
    pub fn with_competitor_sources(mut self, sources: Vec<CompetitorSource>) -> Self {
        self.dedup = Self::build_dedup(&self.config, self.catalog.clone(), sources);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn dedup(&self) -> &DedupResolver {
        &self.dedup
    }

    pub fn repair_available(&self) -> bool {
        self.repair.is_available()
    }

    /// Drop every cached index lookup and catalog listing.
    pub fn clear_caches(&self) {
        self.lookup_cache.clear();
        self.dedup.clear_caches();
    }

    // -----------------------------------------------------------------------
    // Full run
    // -----------------------------------------------------------------------

    /// Run the whole pipeline for `topic` and persist the report.
    ///
    /// Only an empty topic is an error; everything else ends in a terminal
    /// status on the returned report.
    pub async fn run(&self, topic: &str) -> Result<PipelineReport> {
        let slug = slugify(topic);
        if slug.is_empty() {
            return Err(SkillgateError::InvalidTopic(topic.to_string()));
        }
        let trace_id = new_trace_id(topic);
        let span = obs::run_span(&trace_id, topic);
        Ok(self.run_traced(topic, slug, trace_id).instrument(span).await)
    }

    async fn run_traced(&self, topic: &str, slug: String, trace_id: String) -> PipelineReport {
        obs::emit_run_started(&trace_id, topic, &slug);
        let mut report = PipelineReport::new(topic, slug.clone(), trace_id);

        let decision = self.dedup_stage(&mut report, topic).await;
        if decision.should_skip() {
            let nothing = Aggregate {
                overall_score: 0.0,
                hard_failure: false,
            };
            let status = self.router.decide(true, &nothing, RepairResult::Unavailable);
            report.finalize(status);
            obs::emit_run_routed(&report.trace_id, status, 0.0, false);
            self.persist(&report);
            return report;
        }

        let gaps = self.gap_stage(&mut report, &decision).await;
        let sources = self.collect_stage(&mut report, topic).await;
        let document = self
            .generate_stage(&mut report, topic, &slug, &decision, gaps.as_ref(), &sources)
            .await;

        self.validate_and_route(&mut report, document, true).await;
        report
    }

    /// Run the ladder and router over an existing document without
    /// publishing. No repair is attempted.
    pub async fn test_document(&self, slug: &str, document: &str) -> PipelineReport {
        let trace_id = new_trace_id(slug);
        let span = obs::run_span(&trace_id, slug);
        async {
            obs::emit_run_started(&trace_id, slug, slug);
            let mut report = PipelineReport::new(slug, slug, trace_id.clone());
            self.validate_and_route(&mut report, document.to_string(), false)
                .await;
            report
        }
        .instrument(span)
        .await
    }

    /// Test the local copy of `slug`.
    pub async fn test_local(&self, slug: &str) -> Result<PipelineReport> {
        let text = self.store.read_skill(slug)?.ok_or_else(|| {
            SkillgateError::InvalidTopic(format!(
                "no local document at {}",
                self.store.skill_path(slug).display()
            ))
        })?;
        Ok(self.test_document(slug, &text).await)
    }

    /// Run every topic in order, pausing between runs.
    pub async fn batch(&self, topics: &[String]) -> BatchSummary {
        let started_at = Utc::now();
        let mut runs = Vec::new();
        let mut rejected_topics = Vec::new();

        for (i, topic) in topics.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_pacing()).await;
            }
            info!(index = i + 1, total = topics.len(), topic = %topic, "batch topic");
            match self.run(topic).await {
                Ok(report) => runs.push(ReportSummary::from(&report)),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "topic rejected");
                    rejected_topics.push(topic.clone());
                }
            }
        }

        let summary = BatchSummary {
            started_at,
            finished_at: Utc::now(),
            total: topics.len(),
            counts: status_counts(&runs),
            runs,
            rejected_topics,
        };
        match self.store.write_batch(&summary) {
            Ok(path) => info!(path = %path.display(), "batch summary written"),
            Err(e) => warn!(error = %e, "batch summary not written"),
        }
        summary
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn record(&self, report: &mut PipelineReport, stage: Stage, status: StageStatus, notes: Vec<String>, start: Instant) {
        let duration_ms = elapsed_ms(start);
        obs::emit_stage_completed(&report.trace_id, stage, status, duration_ms);
        report.push_step(stage, status, notes, duration_ms);
    }

    async fn dedup_stage(&self, report: &mut PipelineReport, topic: &str) -> DedupDecision {
        let start = Instant::now();
        let decision = self.dedup.resolve(topic).await;

        let mut notes = vec![decision.summary()];
        notes.extend(decision.conflicts.iter().map(|c| {
            format!(
                "{:?}: {}/{} ({})",
                c.match_type,
                c.source_id,
                c.skill_name,
                c.tier.as_str()
            )
            .to_lowercase()
        }));
        let status = if decision.should_skip() {
            StageStatus::Skip
        } else {
            StageStatus::Pass
        };
        self.record(report, Stage::Dedup, status, notes, start);
        decision
    }

    async fn gap_stage(&self, report: &mut PipelineReport, decision: &DedupDecision) -> Option<GapAnalysis> {
        let start = Instant::now();
        if !matches!(decision.action, DedupAction::Compete | DedupAction::Variant) {
            self.record(
                report,
                Stage::GapAnalysis,
                StageStatus::Skip,
                vec!["no competing documents".to_string()],
                start,
            );
            return None;
        }

        let analysis = self.gaps.analyze(decision).await;
        let status = if analysis.sources_read.is_empty() {
            StageStatus::Skip
        } else {
            StageStatus::Pass
        };
        let mut notes = analysis.notes.clone();
        notes.push(format!("focus: {}", analysis.focus.join("; ")));
        report.focus_areas = analysis.focus.clone();
        self.record(report, Stage::GapAnalysis, status, notes, start);
        Some(analysis)
    }

    async fn collect_stage(&self, report: &mut PipelineReport, topic: &str) -> BTreeMap<String, String> {
        let start = Instant::now();
        let timeout = self.config.collaborator_timeout();
        let (sources, status, notes) =
            match tokio::time::timeout(timeout, self.collector.collect(topic)).await {
                Ok(Ok(sources)) if !sources.is_empty() => {
                    let note = format!(
                        "{} sources: {}",
                        sources.len(),
                        sources.keys().cloned().collect::<Vec<_>>().join(", ")
                    );
                    (sources, StageStatus::Pass, vec![note])
                }
                Ok(Ok(sources)) => (
                    sources,
                    StageStatus::Warn,
                    vec!["no sources collected".to_string()],
                ),
                Ok(Err(e)) => {
                    obs::emit_collaborator_error(&report.trace_id, Stage::Collect, &e);
                    (BTreeMap::new(), StageStatus::Warn, vec![format!("collector failed: {e}")])
                }
                Err(_) => (
                    BTreeMap::new(),
                    StageStatus::Warn,
                    vec![format!("collector timed out after {}ms", timeout.as_millis())],
                ),
            };
        report.sources = source_breakdown(&sources);
        self.record(report, Stage::Collect, status, notes, start);
        sources
    }

    async fn generate_stage(
        &self,
        report: &mut PipelineReport,
        topic: &str,
        slug: &str,
        decision: &DedupDecision,
        gaps: Option<&GapAnalysis>,
        sources: &BTreeMap<String, String>,
    ) -> String {
        let start = Instant::now();
        let mut notes = Vec::new();

        let generated = match &self.generator {
            None => {
                notes.push("no generator configured".to_string());
                None
            }
            Some(generator) => {
                let prompt = generation_prompt(&GenerationBrief {
                    topic,
                    slug,
                    action: decision.action,
                    gaps,
                    sources,
                });
                let timeout = self.config.collaborator_timeout();
                match tokio::time::timeout(timeout, generator.generate(&prompt)).await {
                    Ok(Ok(text)) if text.trim().starts_with(REQUIRED_OPENING_MARKER) => {
                        Some(text.trim().to_string())
                    }
                    Ok(Ok(_)) => {
                        notes.push(format!("generator output does not begin with {REQUIRED_OPENING_MARKER}"));
                        None
                    }
                    Ok(Err(e)) => {
                        obs::emit_collaborator_error(&report.trace_id, Stage::Generate, &e);
                        notes.push(format!("generator failed: {e}"));
                        None
                    }
                    Err(_) => {
                        notes.push(format!("generator timed out after {}ms", timeout.as_millis()));
                        None
                    }
                }
            }
        };

        let (document, status) = match generated {
            Some(text) => {
                notes.push(format!("{} chars generated", text.chars().count()));
                (text, StageStatus::Pass)
            }
            None => {
                notes.push("using template document".to_string());
                (template_document(topic, slug, sources), StageStatus::Warn)
            }
        };

        if let Err(e) = self.store.write_skill(slug, &document) {
            notes.push(format!("local copy not written: {e}"));
        }
        self.record(report, Stage::Generate, status, notes, start);
        document
    }

    /// Ladder, routing, optional repair and, when `side_effects` is set,
    /// publish and draft. Persists the report.
    async fn validate_and_route(&self, report: &mut PipelineReport, document: String, side_effects: bool) {
        let outcome = self.ladder.run(&report.trace_id, &document).await;
        let initial = outcome.aggregate;
        for level in outcome.levels {
            report.push_level(level);
        }
        report.overall_score = initial.overall_score;
        report.hard_failure = initial.hard_failure;

        let repair_available = side_effects && self.repair.is_available();
        let mut final_document = document;
        let status = match self.router.initial(&initial, repair_available) {
            Route::Terminal { status } => status,
            Route::AttemptRepair => {
                let attempt = self
                    .repair
                    .attempt(report, &final_document, &self.ladder, &self.router)
                    .await;
                if let (Some(candidate), RepairResult::Revalidated(repaired)) =
                    (attempt.candidate, attempt.result)
                {
                    report.overall_score = repaired.overall_score;
                    report.hard_failure = repaired.hard_failure;
                    final_document = candidate;
                }
                report.push_repair(attempt.record);
                self.router.decide(false, &initial, attempt.result)
            }
        };
        report.finalize(status);
        obs::emit_run_routed(&report.trace_id, status, report.overall_score, report.hard_failure);

        if side_effects {
            self.apply_side_effects(report, status, &final_document).await;
        }
        self.persist(report);
    }

    async fn apply_side_effects(&self, report: &mut PipelineReport, status: FinalStatus, document: &str) {
        let start = Instant::now();
        let action = PublishAction::for_status(status);
        let mut notes = Vec::new();

        if status == FinalStatus::AutoFixed || status == FinalStatus::Beta {
            if let Err(e) = self.store.write_skill(&report.slug, document) {
                notes.push(format!("local copy not written: {e}"));
            }
        }

        let publish_status = if action.publish {
            let request = PublishRequest {
                slug: report.slug.clone(),
                content: document.to_string(),
                label: action.label.clone(),
                message: action.commit_message(&report.topic),
            };
            let timeout = self.config.collaborator_timeout();
            match tokio::time::timeout(timeout, self.publisher.publish(&request)).await {
                Ok(Ok(locator)) => {
                    notes.push(format!("published: {locator}"));
                    StageStatus::Pass
                }
                Ok(Err(e)) => {
                    obs::emit_publish_failed(&report.trace_id, &report.slug, &e);
                    notes.push(format!("publish failed: {e}"));
                    StageStatus::Fail
                }
                Err(_) => {
                    let e = format!("timed out after {}ms", timeout.as_millis());
                    obs::emit_publish_failed(&report.trace_id, &report.slug, &e);
                    notes.push(format!("publish failed: {e}"));
                    StageStatus::Fail
                }
            }
        } else {
            notes.push(format!("not published ({status})"));
            StageStatus::Skip
        };
        self.record(report, Stage::Publish, publish_status, notes, start);

        if action.save_draft {
            match self.store.write_draft(&report.slug, document, report) {
                Ok(path) => info!(path = %path.display(), "draft saved"),
                Err(e) => warn!(error = %e, "draft not saved"),
            }
        }
    }

    fn persist(&self, report: &PipelineReport) -> Option<PathBuf> {
        match self.store.persist(report) {
            Ok(path) => {
                obs::emit_report_persisted(&report.trace_id, &path);
                Some(path)
            }
            Err(e) => {
                obs::emit_report_persist_error(&report.trace_id, &e);
                None
            }
        }
    }
}
