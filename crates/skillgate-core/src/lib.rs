//! skillgate core library
//!
//! Validation ladder, scoring, repair and publish routing for generated skill
//! documents, plus the dedup gate that runs before any of it.

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod dedup;
pub mod document;
pub mod domain;
pub mod extract;
pub mod fakes;
pub mod ladder;
pub mod levels;
pub mod obs;
pub mod pipeline;
pub mod prompt;
pub mod repair;
pub mod router;
pub mod sandbox;
pub mod score;
pub mod store;
pub mod telemetry;

pub use cache::TtlCache;
pub use collaborators::{ContentGenerator, PublishRequest, PublishTarget, SkillCatalog, SourceCollector};
pub use config::PipelineConfig;
pub use dedup::{
    canonical_alias, covered_topics, focus_areas, standard_sources, CompetitorSource,
    DedupResolver, GapAnalysis, GapAnalyzer, ALIASES, DEFAULT_GAPS,
};
pub use document::{slugify, validate_header, HeaderCheck, REQUIRED_OPENING_MARKER};
pub use domain::{
    CodeBlock, DedupAction, DedupConflict, DedupDecision, Ecosystem, FinalStatus, HeaderError,
    Language, Level, LevelResult, LevelStatus, MatchType, OriginTag, PipelineReport, RepairRecord,
    RepairStatus, Result, SkillgateError, SourceBreakdown, Stage, StageRecord, StageStatus,
    StepRecord, Tier,
};
pub use extract::extract;
pub use ladder::{LadderOutcome, ValidationLadder};
pub use levels::{IndexError, IndexLookup, IndexResult, LookupCache, PackageIndex};
pub use pipeline::{new_trace_id, BatchSummary, Collaborators, SkillPipeline};
pub use repair::{plan_repair, RepairAttempt, RepairLoop, RepairPlan, RepairPolicy};
pub use router::{PublishAction, PublishRouter, RepairResult, Route, BETA_LABEL};
pub use sandbox::{
    CodeRunner, ErrorClassifier, ExecutionOutcome, FailureKind, ProcessRunner, RunMode,
    SandboxConfig, SandboxError,
};
pub use score::{aggregate, Aggregate, PUBLISH_THRESHOLD};
pub use store::{status_counts, ReportStore, ReportSummary};
pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
