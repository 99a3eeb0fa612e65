//! Per-level validation results.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// The four rungs of the validation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    L1,
    L2,
    L3,
    L4,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::L1, Level::L2, Level::L3, Level::L4];

    /// Stage name used in persisted reports.
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::L1 => "test_l1_syntax",
            Self::L2 => "test_l2_dependencies",
            Self::L3 => "test_l3_sandbox",
            Self::L4 => "test_l4_mocked",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::L1 => "Syntax",
            Self::L2 => "Dependencies",
            Self::L3 => "Sandbox",
            Self::L4 => "Mocked API",
        }
    }

    /// Whether a FAIL at this level is a hard failure.
    pub fn is_load_bearing(&self) -> bool {
        matches!(self, Self::L1 | Self::L2)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
            Self::L4 => "L4",
        };
        f.write_str(s)
    }
}

/// Outcome of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelStatus {
    Pass,
    Partial,
    Fail,
    Skip,
}

impl LevelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Partial => "PARTIAL",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frozen result of one level for one document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    level: Level,
    status: LevelStatus,
    score: f64,
    observations: Vec<String>,
    failures: Vec<String>,
    duration_ms: u64,
}

impl LevelResult {
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn status(&self) -> LevelStatus {
        self.status
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Accumulates notes while a level runs; [`LevelRecorder::finish`] freezes it.
#[derive(Debug)]
pub struct LevelRecorder {
    level: Level,
    started: Instant,
    observations: Vec<String>,
    failures: Vec<String>,
}

impl LevelRecorder {
    pub fn start(level: Level) -> Self {
        Self {
            level,
            started: Instant::now(),
            observations: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn observe(&mut self, note: impl Into<String>) {
        self.observations.push(note.into());
    }

    pub fn warn(&mut self, note: impl Into<String>) {
        self.observations.push(format!("warning: {}", note.into()));
    }

    pub fn fail(&mut self, note: impl Into<String>) {
        self.failures.push(note.into());
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn finish(self, status: LevelStatus, score: f64) -> LevelResult {
        LevelResult {
            level: self.level,
            status,
            score: score.clamp(0.0, 1.0),
            observations: self.observations,
            failures: self.failures,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// `passed / total`, with an empty total scoring zero.
pub fn ratio(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    }
}
