//! Publish routing state machine.
//!
//! `PENDING -> {PASS, AUTO_FIXED, BETA, FAIL, SKIPPED}`. Rules, in order:
//!
//! 1. dedup resolved to skip: SKIPPED, nothing is validated
//! 2. score at or above threshold and no hard failure: PASS
//! 3. hard failure with a repair capability: repair once; a repaired version
//!    that clears rule 2 is AUTO_FIXED, anything else usable is BETA
//! 4. hard failure with no repair, or a repair that produced nothing: FAIL
//! 5. otherwise: BETA

use serde::{Deserialize, Serialize};

use crate::domain::FinalStatus;
use crate::score::Aggregate;

/// Next step after the first ladder pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Route {
    Terminal { status: FinalStatus },
    AttemptRepair,
}

/// What the single repair attempt yielded, as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepairResult {
    /// No repair capability is configured.
    Unavailable,
    /// The generator returned nothing usable.
    NoCandidate,
    /// A candidate was re-validated with this aggregate.
    Revalidated(Aggregate),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishRouter {
    threshold: f64,
}

impl PublishRouter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn initial(&self, aggregate: &Aggregate, repair_available: bool) -> Route {
        if aggregate.clears(self.threshold) {
            return Route::Terminal {
                status: FinalStatus::Pass,
            };
        }
        match (aggregate.hard_failure, repair_available) {
            (true, true) => Route::AttemptRepair,
            (true, false) => Route::Terminal {
                status: FinalStatus::Fail,
            },
            (false, _) => Route::Terminal {
                status: FinalStatus::Beta,
            },
        }
    }

    /// Terminal state after the one repair attempt. `None` when the repair
    /// produced nothing usable.
    pub fn after_repair(&self, repaired: Option<&Aggregate>) -> FinalStatus {
        match repaired {
            None => FinalStatus::Fail,
            Some(agg) if agg.clears(self.threshold) => FinalStatus::AutoFixed,
            Some(_) => FinalStatus::Beta,
        }
    }

    /// Total decision over every input combination.
    pub fn decide(&self, dedup_skip: bool, aggregate: &Aggregate, repair: RepairResult) -> FinalStatus {
        if dedup_skip {
            return FinalStatus::Skipped;
        }
        let repair_available = !matches!(repair, RepairResult::Unavailable);
        match self.initial(aggregate, repair_available) {
            Route::Terminal { status } => status,
            Route::AttemptRepair => match repair {
                RepairResult::Revalidated(agg) => self.after_repair(Some(&agg)),
                RepairResult::NoCandidate | RepairResult::Unavailable => self.after_repair(None),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Side effects
// ---------------------------------------------------------------------------

/// Label attached to documents published below the bar.
pub const BETA_LABEL: &str = "BETA";

/// Side effects owed for a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAction {
    pub publish: bool,
    pub label: Option<String>,
    pub message_note: Option<String>,
    pub save_draft: bool,
}

impl PublishAction {
    pub fn for_status(status: FinalStatus) -> Self {
        let none = Self {
            publish: false,
            label: None,
            message_note: None,
            save_draft: false,
        };
        match status {
            FinalStatus::Pass => Self {
                publish: true,
                ..none
            },
            FinalStatus::AutoFixed => Self {
                publish: true,
                message_note: Some("auto-fixed".to_string()),
                ..none
            },
            FinalStatus::Beta => Self {
                publish: true,
                label: Some(BETA_LABEL.to_string()),
                save_draft: true,
                ..none
            },
            FinalStatus::Fail => Self {
                save_draft: true,
                ..none
            },
            FinalStatus::Skipped | FinalStatus::Pending => none,
        }
    }

    /// Commit message for the publish target.
    pub fn commit_message(&self, topic: &str) -> String {
        let tag = self.label.as_deref().or(self.message_note.as_deref());
        match tag {
            Some(tag) => format!("feat: add {topic} skill [{tag}]"),
            None => format!("feat: add {topic} skill"),
        }
    }
}
