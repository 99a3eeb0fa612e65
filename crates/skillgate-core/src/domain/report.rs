//! Per-run pipeline report.
//!
//! A [`PipelineReport`] is created when a run for one topic starts, appended
//! to as stages complete, and persisted exactly once when the run is routed
//! to a terminal state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::level::{Level, LevelResult};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Terminal state of a run. `Pending` until the router decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Pending,
    Pass,
    AutoFixed,
    Beta,
    Fail,
    Skipped,
}

impl FinalStatus {
    pub const TERMINAL: [FinalStatus; 5] = [
        FinalStatus::Pass,
        FinalStatus::AutoFixed,
        FinalStatus::Beta,
        FinalStatus::Fail,
        FinalStatus::Skipped,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Pass => "PASS",
            Self::AutoFixed => "AUTO_FIXED",
            Self::Beta => "BETA",
            Self::Fail => "FAIL",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-ladder pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dedup,
    GapAnalysis,
    Collect,
    Generate,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dedup => "dedup",
            Self::GapAnalysis => "gap_analysis",
            Self::Collect => "collect",
            Self::Generate => "generate",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

/// Outcome of the single repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    /// Candidate was re-validated and cleared the publish threshold.
    Accepted,
    /// Candidate was re-validated but did not clear the threshold.
    Insufficient,
    /// Candidate did not begin with the required header marker.
    Rejected,
    /// Generator returned nothing or errored.
    NoCandidate,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Insufficient => "insufficient",
            Self::Rejected => "rejected",
            Self::NoCandidate => "no_candidate",
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One entry in the report's ordered stage list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageRecord {
    Step(StepRecord),
    Level(LevelResult),
    Repair(RepairRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub notes: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRecord {
    pub status: RepairStatus,
    /// Number of failure notes handed to the generator.
    pub failure_notes_sent: usize,
    pub notes: Vec<String>,
    pub duration_ms: u64,
    /// Independent report produced by re-validating the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Box<PipelineReport>>,
}

/// Counts of source excerpts by provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub official: usize,
    pub community: usize,
}

impl SourceBreakdown {
    pub fn total(&self) -> usize {
        self.official + self.community
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub trace_id: String,
    pub topic: String,
    pub slug: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
    pub final_status: FinalStatus,
    pub overall_score: f64,
    pub hard_failure: bool,
    #[serde(default)]
    pub sources: SourceBreakdown,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_areas: Vec<String>,
}

impl PipelineReport {
    pub fn new(topic: impl Into<String>, slug: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            topic: topic.into(),
            slug: slug.into(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            final_status: FinalStatus::Pending,
            overall_score: 0.0,
            hard_failure: false,
            sources: SourceBreakdown::default(),
            focus_areas: Vec::new(),
        }
    }

    pub fn push_step(&mut self, stage: Stage, status: StageStatus, notes: Vec<String>, duration_ms: u64) {
        self.stages.push(StageRecord::Step(StepRecord {
            stage,
            status,
            notes,
            duration_ms,
        }));
    }

    pub fn push_level(&mut self, result: LevelResult) {
        self.stages.push(StageRecord::Level(result));
    }

    pub fn push_repair(&mut self, record: RepairRecord) {
        self.stages.push(StageRecord::Repair(record));
    }

    pub fn levels(&self) -> impl Iterator<Item = &LevelResult> {
        self.stages.iter().filter_map(|s| match s {
            StageRecord::Level(l) => Some(l),
            _ => None,
        })
    }

    pub fn level(&self, level: Level) -> Option<&LevelResult> {
        self.levels().find(|l| l.level() == level)
    }

    pub fn step(&self, stage: Stage) -> Option<&StepRecord> {
        self.stages.iter().find_map(|s| match s {
            StageRecord::Step(step) if step.stage == stage => Some(step),
            _ => None,
        })
    }

    pub fn repair(&self) -> Option<&RepairRecord> {
        self.stages.iter().find_map(|s| match s {
            StageRecord::Repair(r) => Some(r),
            _ => None,
        })
    }

    /// Number of repair stages recorded on this report.
    pub fn repair_attempts(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s, StageRecord::Repair(_)))
            .count()
    }

    /// Failure notes across all levels, prefixed with the level, capped at `limit`.
    pub fn failure_notes(&self, limit: usize) -> Vec<String> {
        self.levels()
            .flat_map(|l| l.failures().iter().map(move |f| format!("{}: {}", l.level(), f)))
            .take(limit)
            .collect()
    }

    /// Move the report into a terminal state. The first terminal status wins.
    pub fn finalize(&mut self, status: FinalStatus) {
        if self.final_status.is_terminal() {
            return;
        }
        self.final_status = status;
        self.finished_at = Some(Utc::now());
    }
}
