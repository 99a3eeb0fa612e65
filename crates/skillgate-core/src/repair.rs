//! Bounded repair of documents that failed a load-bearing level.
//!
//! [`plan_repair`] decides whether an attempt is allowed; [`RepairLoop`]
//! runs it: failure notes plus the document go to the generator, and the
//! candidate is re-validated through the full ladder into an independent
//! report. One attempt per document version, never more.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::collaborators::ContentGenerator;
use crate::document::REQUIRED_OPENING_MARKER;
use crate::domain::{PipelineReport, RepairRecord, RepairStatus};
use crate::ladder::ValidationLadder;
use crate::obs;
use crate::prompt::repair_prompt;
use crate::router::{PublishRouter, RepairResult};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairPolicy {
    /// Maximum repair attempts per document version.
    pub max_attempts: u32,

    /// Maximum failure notes handed to the generator.
    pub note_limit: usize,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            note_limit: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepairPlan {
    /// Send these notes with the document.
    Planned { notes: Vec<String> },

    /// No generator is configured.
    Unavailable,

    /// The attempt budget is already spent.
    ExhaustedAttempts { attempts: u32 },
}

pub fn plan_repair(
    report: &PipelineReport,
    policy: &RepairPolicy,
    generator_available: bool,
) -> RepairPlan {
    if !generator_available {
        return RepairPlan::Unavailable;
    }
    let attempts = report.repair_attempts() as u32;
    if attempts >= policy.max_attempts {
        return RepairPlan::ExhaustedAttempts { attempts };
    }
    RepairPlan::Planned {
        notes: report.failure_notes(policy.note_limit),
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// What one attempt produced.
#[derive(Debug, Clone)]
pub struct RepairAttempt {
    pub record: RepairRecord,
    /// Re-validated candidate, present for `Accepted` and `Insufficient`.
    pub candidate: Option<String>,
    pub result: RepairResult,
}

pub struct RepairLoop {
    generator: Option<Arc<dyn ContentGenerator>>,
    policy: RepairPolicy,
    call_timeout: Duration,
}

impl RepairLoop {
    pub fn new(
        generator: Option<Arc<dyn ContentGenerator>>,
        policy: RepairPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            policy,
            call_timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    /// Attempt a repair of `document`, whose failures are recorded on `report`.
    pub async fn attempt(
        &self,
        report: &PipelineReport,
        document: &str,
        ladder: &ValidationLadder,
        router: &PublishRouter,
    ) -> RepairAttempt {
        let start = Instant::now();
        let plan = plan_repair(report, &self.policy, self.is_available());

        let (notes, generator) = match (plan, self.generator.as_ref()) {
            (RepairPlan::Planned { notes }, Some(g)) => (notes, g),
            (RepairPlan::ExhaustedAttempts { attempts }, _) => {
                return no_candidate(
                    RepairStatus::NoCandidate,
                    0,
                    format!("repair budget spent after {attempts} attempt(s)"),
                    start,
                    RepairResult::NoCandidate,
                );
            }
            _ => {
                return no_candidate(
                    RepairStatus::NoCandidate,
                    0,
                    "no repair capability configured".to_string(),
                    start,
                    RepairResult::Unavailable,
                );
            }
        };

        let sent = notes.len();
        let prompt = repair_prompt(&notes, document);
        let candidate = match tokio::time::timeout(self.call_timeout, generator.generate(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => {
                return self.finish(no_candidate(
                    RepairStatus::NoCandidate,
                    sent,
                    "generator returned an empty document".to_string(),
                    start,
                    RepairResult::NoCandidate,
                ), report)
            }
            Ok(Err(e)) => {
                return self.finish(no_candidate(
                    RepairStatus::NoCandidate,
                    sent,
                    format!("generator failed: {e}"),
                    start,
                    RepairResult::NoCandidate,
                ), report)
            }
            Err(_) => {
                return self.finish(no_candidate(
                    RepairStatus::NoCandidate,
                    sent,
                    format!("generator timed out after {}ms", self.call_timeout.as_millis()),
                    start,
                    RepairResult::NoCandidate,
                ), report)
            }
        };

        if !candidate.starts_with(REQUIRED_OPENING_MARKER) {
            return self.finish(no_candidate(
                RepairStatus::Rejected,
                sent,
                format!("candidate does not begin with {REQUIRED_OPENING_MARKER}"),
                start,
                RepairResult::NoCandidate,
            ), report);
        }

        let mut nested = PipelineReport::new(
            report.topic.clone(),
            report.slug.clone(),
            format!("{}-repair", report.trace_id),
        );
        let outcome = ladder.run(&nested.trace_id, &candidate).await;
        for level in outcome.levels {
            nested.push_level(level);
        }
        nested.overall_score = outcome.aggregate.overall_score;
        nested.hard_failure = outcome.aggregate.hard_failure;
        nested.finalize(router.decide(false, &outcome.aggregate, RepairResult::Unavailable));

        let status = if outcome.aggregate.clears(router.threshold()) {
            RepairStatus::Accepted
        } else {
            RepairStatus::Insufficient
        };
        let note = format!(
            "candidate scored {:.2}{}",
            outcome.aggregate.overall_score,
            if outcome.aggregate.hard_failure {
                " with a hard failure"
            } else {
                ""
            }
        );

        self.finish(
            RepairAttempt {
                record: RepairRecord {
                    status,
                    failure_notes_sent: sent,
                    notes: vec![note],
                    duration_ms: start.elapsed().as_millis() as u64,
                    report: Some(Box::new(nested)),
                },
                candidate: Some(candidate),
                result: RepairResult::Revalidated(outcome.aggregate),
            },
            report,
        )
    }

    fn finish(&self, attempt: RepairAttempt, report: &PipelineReport) -> RepairAttempt {
        obs::emit_repair_attempted(
            &report.trace_id,
            attempt.record.status,
            attempt.record.failure_notes_sent,
        );
        attempt
    }
}

fn no_candidate(
    status: RepairStatus,
    sent: usize,
    note: String,
    start: Instant,
    result: RepairResult,
) -> RepairAttempt {
    RepairAttempt {
        record: RepairRecord {
            status,
            failure_notes_sent: sent,
            notes: vec![note],
            duration_ms: start.elapsed().as_millis() as u64,
            report: None,
        },
        candidate: None,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::domain::{FinalStatus, Level, LevelRecorder, LevelStatus};
    use crate::fakes::{MemoryPackageIndex, ScriptedGenerator, ScriptedRunner};
    use crate::levels::LookupCache;
    use crate::sandbox::ErrorClassifier;

    fn ladder() -> ValidationLadder {
        let config = PipelineConfig {
            index_spacing_ms: 0,
            ..PipelineConfig::default()
        };
        ValidationLadder::new(
            &config,
            Arc::new(ScriptedRunner::all_ok()),
            Arc::new(MemoryPackageIndex::new()),
            Arc::new(LookupCache::new(Duration::from_secs(60))),
            ErrorClassifier::standard(),
        )
    }

    fn failing_report() -> PipelineReport {
        let mut report = PipelineReport::new("Stripe", "stripe", "abc123def456");
        let mut rec = LevelRecorder::start(Level::L1);
        rec.fail("[python|official] block #1: SyntaxError L1: invalid syntax");
        report.push_level(rec.finish(LevelStatus::Fail, 0.0));
        report
    }

    fn repair_loop(generator: ScriptedGenerator) -> RepairLoop {
        RepairLoop::new(
            Some(Arc::new(generator)),
            RepairPolicy::default(),
            Duration::from_secs(5),
        )
    }

    const FIXED: &str = "---\nname: stripe\ndescription: Stripe patterns\n---\n\n```python\nprint('fixed ok')\n```\n";

    #[test]
    fn test_plan_respects_budget() {
        let mut report = failing_report();
        let policy = RepairPolicy::default();
        assert!(matches!(
            plan_repair(&report, &policy, true),
            RepairPlan::Planned { ref notes } if notes.len() == 1
        ));
        assert_eq!(plan_repair(&report, &policy, false), RepairPlan::Unavailable);

        report.push_repair(RepairRecord {
            status: RepairStatus::NoCandidate,
            failure_notes_sent: 1,
            notes: vec![],
            duration_ms: 0,
            report: None,
        });
        assert_eq!(
            plan_repair(&report, &policy, true),
            RepairPlan::ExhaustedAttempts { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn test_accepted_candidate_is_revalidated() {
        let generator = ScriptedGenerator::replying(&[FIXED]);
        let attempt = repair_loop(generator.clone())
            .attempt(&failing_report(), "---\nbroken", &ladder(), &PublishRouter::new(0.75))
            .await;

        assert_eq!(attempt.record.status, RepairStatus::Accepted);
        assert_eq!(attempt.record.failure_notes_sent, 1);
        assert_eq!(attempt.candidate.as_deref(), Some(FIXED.trim()));
        let nested = attempt.record.report.expect("nested report");
        assert_eq!(nested.trace_id, "abc123def456-repair");
        assert_eq!(nested.final_status, FinalStatus::Pass);
        assert_eq!(generator.prompts().len(), 1);
        assert!(generator.prompts()[0].contains("L1: [python|official] block #1"));
    }

    #[tokio::test]
    async fn test_candidate_without_marker_is_rejected() {
        let attempt = repair_loop(ScriptedGenerator::replying(&["Sure! Here is the fix."]))
            .attempt(&failing_report(), "---\nbroken", &ladder(), &PublishRouter::new(0.75))
            .await;
        assert_eq!(attempt.record.status, RepairStatus::Rejected);
        assert!(attempt.candidate.is_none());
        assert_eq!(attempt.result, RepairResult::NoCandidate);
    }

    #[tokio::test]
    async fn test_generator_error_is_no_candidate() {
        let attempt = repair_loop(ScriptedGenerator::failing("quota exceeded"))
            .attempt(&failing_report(), "---\nbroken", &ladder(), &PublishRouter::new(0.75))
            .await;
        assert_eq!(attempt.record.status, RepairStatus::NoCandidate);
        assert!(attempt.record.notes[0].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_unavailable_without_generator() {
        let attempt = RepairLoop::new(None, RepairPolicy::default(), Duration::from_secs(5))
            .attempt(&failing_report(), "---\nbroken", &ladder(), &PublishRouter::new(0.75))
            .await;
        assert_eq!(attempt.result, RepairResult::Unavailable);
    }
}
