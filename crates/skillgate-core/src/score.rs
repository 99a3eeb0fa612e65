//! Score aggregation over the four ladder levels.
//!
//! The overall score is the mean of a per-level status credit. Only a FAIL at
//! a load-bearing level (L1 syntax, L2 dependencies) is a hard failure.

use serde::{Deserialize, Serialize};

use crate::domain::{Level, LevelResult, LevelStatus};

/// Minimum overall score for a document to publish without a label.
pub const PUBLISH_THRESHOLD: f64 = 0.75;

/// Credit for a PARTIAL level.
pub const PARTIAL_CREDIT: f64 = 0.5;

/// Neutral credit for a level that had nothing to test.
pub fn skip_credit(level: Level) -> f64 {
    match level {
        Level::L1 | Level::L2 | Level::L4 => 0.9,
        Level::L3 => 0.8,
    }
}

pub fn status_credit(level: Level, status: LevelStatus) -> f64 {
    match status {
        LevelStatus::Pass => 1.0,
        LevelStatus::Partial => PARTIAL_CREDIT,
        LevelStatus::Fail => 0.0,
        LevelStatus::Skip => skip_credit(level),
    }
}

/// Aggregated verdict for one document version.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub overall_score: f64,
    pub hard_failure: bool,
}

impl Aggregate {
    /// Whether this clears the publish bar at `threshold`.
    pub fn clears(&self, threshold: f64) -> bool {
        !self.hard_failure && self.overall_score >= threshold
    }
}

/// Combine level results. A level missing from `results` earns no credit.
pub fn aggregate<'a, I>(results: I) -> Aggregate
where
    I: IntoIterator<Item = &'a LevelResult>,
{
    let results: Vec<&LevelResult> = results.into_iter().collect();
    let status_of = |level: Level| {
        results
            .iter()
            .find(|r| r.level() == level)
            .map(|r| r.status())
    };

    let total: f64 = Level::ALL
        .iter()
        .map(|&level| status_of(level).map_or(0.0, |s| status_credit(level, s)))
        .sum();
    let hard_failure = Level::ALL
        .iter()
        .filter(|l| l.is_load_bearing())
        .any(|&l| status_of(l) == Some(LevelStatus::Fail));

    Aggregate {
        overall_score: total / Level::ALL.len() as f64,
        hard_failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LevelRecorder;

    fn results(statuses: [LevelStatus; 4]) -> Vec<LevelResult> {
        Level::ALL
            .iter()
            .zip(statuses)
            .map(|(&level, status)| LevelRecorder::start(level).finish(status, 0.0))
            .collect()
    }

    #[test]
    fn test_all_pass() {
        let agg = aggregate(&results([LevelStatus::Pass; 4]));
        assert_eq!(agg.overall_score, 1.0);
        assert!(!agg.hard_failure);
        assert!(agg.clears(PUBLISH_THRESHOLD));
    }

    #[test]
    fn test_skips_use_per_level_credit() {
        use LevelStatus::*;
        let agg = aggregate(&results([Pass, Pass, Skip, Pass]));
        assert!((agg.overall_score - 0.95).abs() < 1e-9);

        let agg = aggregate(&results([Pass, Skip, Skip, Skip]));
        assert!((agg.overall_score - (1.0 + 0.9 + 0.8 + 0.9) / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_hard_failure_only_from_l1_l2() {
        use LevelStatus::*;
        assert!(aggregate(&results([Fail, Pass, Pass, Pass])).hard_failure);
        assert!(aggregate(&results([Pass, Fail, Pass, Pass])).hard_failure);
        let agg = aggregate(&results([Pass, Pass, Fail, Fail]));
        assert!(!agg.hard_failure);
        assert_eq!(agg.overall_score, 0.5);
    }

    #[test]
    fn test_hard_failure_never_clears() {
        use LevelStatus::*;
        let agg = aggregate(&results([Pass, Fail, Pass, Pass]));
        assert_eq!(agg.overall_score, 0.75);
        assert!(!agg.clears(PUBLISH_THRESHOLD));
    }

    #[test]
    fn test_missing_level_earns_nothing() {
        let only_l1 = vec![LevelRecorder::start(Level::L1).finish(LevelStatus::Pass, 1.0)];
        assert_eq!(aggregate(&only_l1).overall_score, 0.25);
    }
}
