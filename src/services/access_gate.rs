use serde::Serialize;

use crate::models::progress::{NextStep, StudentQuizProgress, MAX_FAILED_ATTEMPTS};

#[derive(Debug, Clone, Serialize)]
pub struct GateDecision {
    pub allow: bool,
    pub must_retake: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelDecision {
    pub allow: bool,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextStep>,
}

/// Pure decision layer over a progress record. No side effects; the
/// orchestrator and the routes both consult it so the two can never
/// disagree about what a student may do next.
pub struct AccessGate;

impl AccessGate {
    pub fn can_take_main_quiz(progress: &StudentQuizProgress) -> GateDecision {
        if progress.has_passed() {
            return GateDecision {
                allow: false,
                must_retake: false,
                reason: Some("You have already passed this quiz".to_string()),
            };
        }
        if progress.failed_attempts >= MAX_FAILED_ATTEMPTS {
            return GateDecision {
                allow: false,
                must_retake: false,
                reason: Some("Maximum number of failed attempts reached".to_string()),
            };
        }
        if let Some(level) = progress.assistance_target() {
            return GateDecision {
                allow: false,
                must_retake: false,
                reason: Some(format!(
                    "Assistance level {} must be completed before retaking the quiz",
                    level
                )),
            };
        }
        if progress.must_retake_main_quiz && progress.can_take_main_quiz {
            return GateDecision {
                allow: true,
                must_retake: true,
                reason: None,
            };
        }
        GateDecision {
            allow: true,
            must_retake: false,
            reason: None,
        }
    }

    pub fn can_access_assistance_level(
        progress: &StudentQuizProgress,
        level: u8,
    ) -> LevelDecision {
        if progress.level_completed(level) {
            // Completed levels stay open for read-only review.
            return LevelDecision {
                allow: true,
                is_completed: true,
                reason: None,
                next_action: (level == 3).then_some(NextStep::ViewAssistanceLevel3),
            };
        }

        if progress.override_system_flow {
            return match progress.manually_assigned_level {
                Some(assigned) if assigned == level as i32 => LevelDecision {
                    allow: true,
                    is_completed: false,
                    reason: None,
                    next_action: Some(NextStep::complete_level(level)),
                },
                _ => LevelDecision {
                    allow: false,
                    is_completed: false,
                    reason: Some(format!(
                        "Your teacher has routed you to a different assistance level than {}",
                        level
                    )),
                    next_action: None,
                },
            };
        }

        if progress.failed_attempts >= level as i32 {
            return LevelDecision {
                allow: true,
                is_completed: false,
                reason: None,
                next_action: Some(NextStep::complete_level(level)),
            };
        }

        LevelDecision {
            allow: false,
            is_completed: false,
            reason: Some(format!(
                "Assistance level {} unlocks after {} failed attempts (currently {})",
                level, level, progress.failed_attempts
            )),
            next_action: None,
        }
    }

    /// The routing hint for the status endpoint. `None` once the quiz is
    /// passed: there is nothing left to do.
    pub fn next_step_for(progress: &StudentQuizProgress) -> Option<NextStep> {
        if progress.has_passed() {
            None
        } else {
            progress.next_step
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::OverrideStatus;
    use uuid::Uuid;

    fn progress() -> StudentQuizProgress {
        StudentQuizProgress::fresh(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn fresh_student_may_take_the_quiz() {
        let p = progress();
        let d = AccessGate::can_take_main_quiz(&p);
        assert!(d.allow);
        assert!(!d.must_retake);
    }

    #[test]
    fn passed_quiz_denies_further_attempts() {
        let mut p = progress();
        p.record_pass(Uuid::new_v4());
        let d = AccessGate::can_take_main_quiz(&p);
        assert!(!d.allow);
        assert!(d.reason.unwrap().contains("already passed"));
    }

    #[test]
    fn pending_assistance_blocks_the_main_quiz() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        let d = AccessGate::can_take_main_quiz(&p);
        assert!(!d.allow);
        assert!(d.reason.unwrap().contains("level 1"));
    }

    #[test]
    fn completing_assistance_reopens_the_quiz_as_retake() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        p.complete_level(1, chrono::Utc::now());
        let d = AccessGate::can_take_main_quiz(&p);
        assert!(d.allow);
        assert!(d.must_retake);
    }

    #[test]
    fn max_failed_attempts_is_terminal() {
        let mut p = progress();
        p.apply_override(OverrideStatus::Failed);
        let d = AccessGate::can_take_main_quiz(&p);
        assert!(!d.allow);
        assert!(d.reason.unwrap().contains("Maximum"));
    }

    #[test]
    fn locked_level_names_the_threshold() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        let d = AccessGate::can_access_assistance_level(&p, 2);
        assert!(!d.allow);
        assert!(d.reason.unwrap().contains("2 failed attempts"));

        let d = AccessGate::can_access_assistance_level(&p, 1);
        assert!(d.allow);
        assert!(!d.is_completed);
    }

    #[test]
    fn completed_level_stays_viewable() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        p.record_terminal_fail(Uuid::new_v4());
        p.record_terminal_fail(Uuid::new_v4());
        p.complete_level(3, chrono::Utc::now());
        let d = AccessGate::can_access_assistance_level(&p, 3);
        assert!(d.allow);
        assert!(d.is_completed);
        assert_eq!(d.next_action, Some(NextStep::ViewAssistanceLevel3));
    }

    #[test]
    fn manual_assignment_beats_thresholds_both_ways() {
        let mut p = progress();
        p.assign_level(2);
        // Assigned level opens without any failed attempts.
        assert!(AccessGate::can_access_assistance_level(&p, 2).allow);
        // Other levels close even if thresholds would allow them.
        p.failed_attempts = 3;
        p.refresh_accessibility();
        assert!(!AccessGate::can_access_assistance_level(&p, 1).allow);
        assert!(!AccessGate::can_access_assistance_level(&p, 3).allow);
    }

    #[test]
    fn accessibility_implies_threshold() {
        // P1: level N accessible implies failed_attempts >= N, and never
        // once the level is completed.
        let mut p = progress();
        for _ in 0..3 {
            p.record_terminal_fail(Uuid::new_v4());
            for level in 1..=3u8 {
                let accessible = match level {
                    1 => p.level1_accessible,
                    2 => p.level2_accessible,
                    _ => p.level3_accessible,
                };
                if accessible {
                    assert!(p.failed_attempts >= level as i32);
                    assert!(!p.level_completed(level));
                }
            }
            p.complete_level(p.assistance_target().unwrap_or(3), chrono::Utc::now());
        }
    }
}
