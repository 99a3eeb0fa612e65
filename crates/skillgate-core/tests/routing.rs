//! Router totality and side-effect mapping over the whole input grid.

use skillgate_core::{Aggregate, FinalStatus, PublishAction, PublishRouter, RepairResult, PUBLISH_THRESHOLD};

fn repair_results() -> Vec<RepairResult> {
    let mut out = vec![RepairResult::Unavailable, RepairResult::NoCandidate];
    for score in [0.0, 0.5, 0.75, 1.0] {
        for hard in [false, true] {
            out.push(RepairResult::Revalidated(Aggregate {
                overall_score: score,
                hard_failure: hard,
            }));
        }
    }
    out
}

#[test]
fn test_every_input_reaches_a_terminal_state() {
    let router = PublishRouter::new(PUBLISH_THRESHOLD);
    for dedup_skip in [false, true] {
        for hard_failure in [false, true] {
            for overall_score in [0.0, 0.25, 0.5, 0.74, 0.75, 0.9, 1.0] {
                for repair in repair_results() {
                    let agg = Aggregate {
                        overall_score,
                        hard_failure,
                    };
                    let status = router.decide(dedup_skip, &agg, repair);
                    assert!(status.is_terminal());
                    assert_eq!(status == FinalStatus::Skipped, dedup_skip);
                    if !hard_failure && !dedup_skip {
                        // repair never changes the outcome without a hard failure
                        assert!(matches!(status, FinalStatus::Pass | FinalStatus::Beta));
                    }
                    if status == FinalStatus::AutoFixed {
                        assert!(hard_failure);
                    }
                }
            }
        }
    }
}

#[test]
fn test_hard_failure_never_passes_directly() {
    let router = PublishRouter::new(PUBLISH_THRESHOLD);
    let agg = Aggregate {
        overall_score: 1.0,
        hard_failure: true,
    };
    for repair in repair_results() {
        assert_ne!(router.decide(false, &agg, repair), FinalStatus::Pass);
    }
}

#[test]
fn test_every_terminal_state_has_consistent_side_effects() {
    for status in FinalStatus::TERMINAL {
        let action = PublishAction::for_status(status);
        match status {
            FinalStatus::Pass | FinalStatus::AutoFixed => assert!(action.publish && !action.save_draft),
            FinalStatus::Beta => assert!(action.publish && action.save_draft && action.label.is_some()),
            FinalStatus::Fail => assert!(!action.publish && action.save_draft),
            FinalStatus::Skipped | FinalStatus::Pending => {
                assert!(!action.publish && !action.save_draft)
            }
        }
    }
}
