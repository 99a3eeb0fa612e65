//! Domain models for skillgate.
//!
//! Canonical definitions for the core entities:
//! - `CodeBlock`: one fenced code sample, immutable once extracted
//! - `LevelResult`: frozen outcome of one validation level
//! - `PipelineReport`: the per-run record that gets persisted
//! - `DedupDecision`: the upstream gate's verdict on a topic

pub mod block;
pub mod dedup;
pub mod error;
pub mod level;
pub mod report;

pub use block::{CodeBlock, Ecosystem, Language, OriginTag};
pub use dedup::{DedupAction, DedupConflict, DedupDecision, MatchType, Tier};
pub use error::{HeaderError, Result, SkillgateError};
pub use level::{Level, LevelRecorder, LevelResult, LevelStatus};
pub use report::{
    FinalStatus, PipelineReport, RepairRecord, RepairStatus, SourceBreakdown, Stage, StageRecord,
    StageStatus, StepRecord,
};
