use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::submission::SubmissionStatus;

/// A terminal FAILED outcome at each of these counts unlocks the matching
/// assistance level; the fourth is the end of the road.
pub const MAX_FAILED_ATTEMPTS: i32 = 4;
pub const ASSISTANCE_LEVELS: u8 = 3;

/// Routing hint consumed by the client to redirect the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "next_step")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextStep {
    #[sqlx(rename = "TAKE_MAIN_QUIZ_NOW")]
    TakeMainQuizNow,
    #[sqlx(rename = "COMPLETE_ASSISTANCE_LEVEL1")]
    CompleteAssistanceLevel1,
    #[sqlx(rename = "COMPLETE_ASSISTANCE_LEVEL2")]
    CompleteAssistanceLevel2,
    #[sqlx(rename = "COMPLETE_ASSISTANCE_LEVEL3")]
    CompleteAssistanceLevel3,
    #[sqlx(rename = "TRY_MAIN_QUIZ_AGAIN")]
    TryMainQuizAgain,
    #[sqlx(rename = "QUIZ_FAILED_MAX_ATTEMPTS")]
    QuizFailedMaxAttempts,
    #[sqlx(rename = "VIEW_ASSISTANCE_LEVEL3")]
    ViewAssistanceLevel3,
}

impl NextStep {
    pub fn complete_level(level: u8) -> Self {
        match level {
            1 => NextStep::CompleteAssistanceLevel1,
            2 => NextStep::CompleteAssistanceLevel2,
            _ => NextStep::CompleteAssistanceLevel3,
        }
    }
}

/// Teacher-forced progress state, bypassing the normal flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverrideStatus {
    Passed,
    Failed,
    #[serde(alias = "ON-GOING")]
    Ongoing,
}

/// The single per-(student, quiz) coordination record. Every routing
/// decision reads and writes this row; all mutation goes through the
/// transition methods below so the counters keep their invariants:
///
/// * `failed_attempts` moves only on a terminal FAILED main-quiz outcome.
/// * `current_attempt` moves on every main-quiz submission, capped at 4.
/// * `level{N}_completed` is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentQuizProgress {
    pub id: Uuid,
    pub student_id: Uuid,
    pub quiz_id: Uuid,
    pub current_attempt: i32,
    pub failed_attempts: i32,
    pub last_attempt_passed: Option<bool>,
    pub final_status: Option<SubmissionStatus>,
    pub level1_completed: bool,
    pub level2_completed: bool,
    pub level3_completed: bool,
    pub level1_completed_at: Option<DateTime<Utc>>,
    pub level2_completed_at: Option<DateTime<Utc>>,
    pub level3_completed_at: Option<DateTime<Utc>>,
    pub level1_accessible: bool,
    pub level2_accessible: bool,
    pub level3_accessible: bool,
    pub must_retake_main_quiz: bool,
    pub can_take_main_quiz: bool,
    pub next_step: Option<NextStep>,
    pub last_submission_id: Option<Uuid>,
    pub manually_assigned_level: Option<i32>,
    pub override_system_flow: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentQuizProgress {
    /// In-memory default matching a freshly inserted row. The database is
    /// the normal creation path; this exists for the pure transition tests.
    pub fn fresh(student_id: Uuid, quiz_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            student_id,
            quiz_id,
            current_attempt: 0,
            failed_attempts: 0,
            last_attempt_passed: None,
            final_status: None,
            level1_completed: false,
            level2_completed: false,
            level3_completed: false,
            level1_completed_at: None,
            level2_completed_at: None,
            level3_completed_at: None,
            level1_accessible: false,
            level2_accessible: false,
            level3_accessible: false,
            must_retake_main_quiz: false,
            can_take_main_quiz: true,
            next_step: Some(NextStep::TakeMainQuizNow),
            last_submission_id: None,
            manually_assigned_level: None,
            override_system_flow: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_passed(&self) -> bool {
        self.final_status == Some(SubmissionStatus::Passed)
    }

    pub fn level_completed(&self, level: u8) -> bool {
        match level {
            1 => self.level1_completed,
            2 => self.level2_completed,
            3 => self.level3_completed,
            _ => false,
        }
    }

    /// The assistance level the student should be working on right now, or
    /// `None` when nothing is pending. A teacher's manual assignment takes
    /// strict precedence over the failed-attempts thresholds.
    pub fn assistance_target(&self) -> Option<u8> {
        if self.override_system_flow {
            return match self.manually_assigned_level {
                Some(level @ 1..=3) if !self.level_completed(level as u8) => Some(level as u8),
                _ => None,
            };
        }
        let unlocked = self.failed_attempts.min(ASSISTANCE_LEVELS as i32) as u8;
        (1..=unlocked).find(|&level| !self.level_completed(level))
    }

    /// Recompute the derived `level{N}_accessible` flags. Accessibility
    /// never holds for a completed level.
    pub fn refresh_accessibility(&mut self) {
        let threshold = |level: u8| -> bool {
            if self.override_system_flow {
                self.manually_assigned_level == Some(level as i32)
            } else {
                self.failed_attempts >= level as i32
            }
        };
        self.level1_accessible = threshold(1) && !self.level1_completed;
        self.level2_accessible = threshold(2) && !self.level2_completed;
        self.level3_accessible = threshold(3) && !self.level3_completed;
    }

    fn bump_attempt(&mut self, submission_id: Uuid) {
        self.current_attempt = (self.current_attempt + 1).min(MAX_FAILED_ATTEMPTS);
        self.last_submission_id = Some(submission_id);
        // Starting a new main-quiz attempt consumes the retake flag.
        self.must_retake_main_quiz = false;
    }

    /// The quiz is cleared. Terminal: the access gate denies all further
    /// attempts once `final_status` is PASSED.
    pub fn record_pass(&mut self, submission_id: Uuid) {
        self.bump_attempt(submission_id);
        self.final_status = Some(SubmissionStatus::Passed);
        self.last_attempt_passed = Some(true);
        self.can_take_main_quiz = false;
        self.next_step = None;
        self.refresh_accessibility();
    }

    /// Teacher grading retroactively passed a submission. Same terminal
    /// effect as `record_pass` but without consuming an attempt: the
    /// attempt already happened.
    pub fn pass_via_grading(&mut self) {
        self.final_status = Some(SubmissionStatus::Passed);
        self.last_attempt_passed = Some(true);
        self.must_retake_main_quiz = false;
        self.can_take_main_quiz = false;
        self.next_step = None;
        self.refresh_accessibility();
    }

    /// A terminal FAILED outcome. Increments `failed_attempts` and routes
    /// to the assistance level matching the exact count reached, skipping
    /// levels already completed; the fourth failure is final.
    pub fn record_terminal_fail(&mut self, submission_id: Uuid) {
        self.bump_attempt(submission_id);
        self.apply_failed_outcome();
    }

    /// Teacher grading settled a PENDING submission as FAILED. The attempt
    /// was already counted when it was submitted; only the failure itself
    /// lands now.
    pub fn fail_via_grading(&mut self) {
        self.apply_failed_outcome();
    }

    fn apply_failed_outcome(&mut self) {
        self.failed_attempts += 1;
        self.last_attempt_passed = Some(false);
        self.refresh_accessibility();

        if self.failed_attempts >= MAX_FAILED_ATTEMPTS {
            self.can_take_main_quiz = false;
            self.next_step = Some(NextStep::QuizFailedMaxAttempts);
        } else if let Some(level) = self.assistance_target() {
            self.can_take_main_quiz = false;
            self.next_step = Some(NextStep::complete_level(level));
        } else {
            // Every unlocked level is already done; straight back to the quiz.
            self.can_take_main_quiz = true;
            self.next_step = Some(NextStep::TryMainQuizAgain);
        }
    }

    /// A submission left PENDING for teacher grading (some verdicts were
    /// indeterminate). Not a failed attempt: counters other than
    /// `current_attempt` stay put and the student may retake meanwhile.
    pub fn record_pending(&mut self, submission_id: Uuid) {
        self.bump_attempt(submission_id);
        self.last_attempt_passed = None;
        self.can_take_main_quiz = true;
        self.next_step = Some(NextStep::TakeMainQuizNow);
        self.refresh_accessibility();
    }

    /// Completion effects shared by all three assistance levels. Returns
    /// false when the level was already completed (the flag is monotonic;
    /// repeated completions are no-ops here).
    pub fn complete_level(&mut self, level: u8, now: DateTime<Utc>) -> bool {
        let newly = !self.level_completed(level);
        if newly {
            match level {
                1 => {
                    self.level1_completed = true;
                    self.level1_completed_at = Some(now);
                }
                2 => {
                    self.level2_completed = true;
                    self.level2_completed_at = Some(now);
                }
                _ => {
                    self.level3_completed = true;
                    self.level3_completed_at = Some(now);
                }
            }
        }
        if self.manually_assigned_level == Some(level as i32) {
            self.manually_assigned_level = None;
            self.override_system_flow = false;
        }
        self.must_retake_main_quiz = true;
        self.can_take_main_quiz = true;
        self.next_step = Some(NextStep::TryMainQuizAgain);
        self.refresh_accessibility();
        newly
    }

    /// Teacher routes the student into a specific level by hand.
    pub fn assign_level(&mut self, level: u8) {
        self.manually_assigned_level = Some(level as i32);
        self.override_system_flow = true;
        if !self.level_completed(level) {
            self.can_take_main_quiz = false;
            self.next_step = Some(NextStep::complete_level(level));
        }
        self.refresh_accessibility();
    }

    /// Teacher forces a final state, resetting the counters and flags to
    /// something consistent with it. Completed-level flags stay (monotonic).
    pub fn apply_override(&mut self, forced: OverrideStatus) {
        self.manually_assigned_level = None;
        self.override_system_flow = false;
        match forced {
            OverrideStatus::Passed => {
                self.final_status = Some(SubmissionStatus::Passed);
                self.last_attempt_passed = Some(true);
                self.must_retake_main_quiz = false;
                self.can_take_main_quiz = false;
                self.next_step = None;
            }
            OverrideStatus::Failed => {
                self.final_status = Some(SubmissionStatus::Failed);
                self.failed_attempts = MAX_FAILED_ATTEMPTS;
                self.last_attempt_passed = Some(false);
                self.must_retake_main_quiz = false;
                self.can_take_main_quiz = false;
                self.next_step = Some(NextStep::QuizFailedMaxAttempts);
            }
            OverrideStatus::Ongoing => {
                self.final_status = None;
                self.failed_attempts = 0;
                self.last_attempt_passed = None;
                self.must_retake_main_quiz = false;
                self.can_take_main_quiz = true;
                self.next_step = Some(NextStep::TakeMainQuizNow);
            }
        }
        self.refresh_accessibility();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> StudentQuizProgress {
        StudentQuizProgress::fresh(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn fail_ladder_unlocks_levels_in_order() {
        let mut p = progress();

        p.record_terminal_fail(Uuid::new_v4());
        assert_eq!(p.failed_attempts, 1);
        assert!(p.level1_accessible);
        assert!(!p.level2_accessible);
        assert_eq!(p.next_step, Some(NextStep::CompleteAssistanceLevel1));
        assert!(!p.can_take_main_quiz);

        p.complete_level(1, Utc::now());
        assert!(p.must_retake_main_quiz);
        assert_eq!(p.next_step, Some(NextStep::TryMainQuizAgain));

        p.record_terminal_fail(Uuid::new_v4());
        assert_eq!(p.failed_attempts, 2);
        assert!(!p.level1_accessible, "completed level is never accessible");
        assert!(p.level2_accessible);
        assert_eq!(p.next_step, Some(NextStep::CompleteAssistanceLevel2));

        p.complete_level(2, Utc::now());
        p.record_terminal_fail(Uuid::new_v4());
        assert_eq!(p.next_step, Some(NextStep::CompleteAssistanceLevel3));

        p.complete_level(3, Utc::now());
        p.record_terminal_fail(Uuid::new_v4());
        assert_eq!(p.failed_attempts, 4);
        assert_eq!(p.next_step, Some(NextStep::QuizFailedMaxAttempts));
        assert!(!p.can_take_main_quiz);
    }

    #[test]
    fn threshold_on_completed_level_skips_to_lowest_incomplete() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        p.record_terminal_fail(Uuid::new_v4());
        // Level 2 was completed out of band (manual assignment), level 1 not.
        p.level2_completed = true;
        p.refresh_accessibility();
        assert_eq!(p.assistance_target(), Some(1));
    }

    #[test]
    fn all_unlocked_levels_done_routes_back_to_quiz() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        p.complete_level(1, Utc::now());
        p.level2_completed = true;
        p.record_terminal_fail(Uuid::new_v4());
        assert_eq!(p.next_step, Some(NextStep::TryMainQuizAgain));
        assert!(p.can_take_main_quiz);
    }

    #[test]
    fn pass_is_terminal_and_clears_routing() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        p.complete_level(1, Utc::now());
        p.record_pass(Uuid::new_v4());
        assert!(p.has_passed());
        assert_eq!(p.next_step, None);
        assert!(!p.can_take_main_quiz);
        assert_eq!(p.failed_attempts, 1, "pass never touches failed_attempts");
    }

    #[test]
    fn pending_does_not_consume_a_failed_attempt() {
        let mut p = progress();
        p.record_pending(Uuid::new_v4());
        assert_eq!(p.failed_attempts, 0);
        assert_eq!(p.current_attempt, 1);
        assert_eq!(p.last_attempt_passed, None);
        assert!(p.can_take_main_quiz);
    }

    #[test]
    fn current_attempt_caps_at_four() {
        let mut p = progress();
        for _ in 0..6 {
            p.record_pending(Uuid::new_v4());
        }
        assert_eq!(p.current_attempt, 4);
    }

    #[test]
    fn completion_is_idempotent_on_flags() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        assert!(p.complete_level(1, Utc::now()));
        let first_stamp = p.level1_completed_at;
        assert!(!p.complete_level(1, Utc::now()));
        assert!(p.level1_completed);
        assert_eq!(p.level1_completed_at, first_stamp);
    }

    #[test]
    fn manual_assignment_overrides_thresholds() {
        let mut p = progress();
        p.assign_level(3);
        assert_eq!(p.assistance_target(), Some(3));
        assert!(p.level3_accessible, "assigned level is accessible at zero fails");
        assert!(!p.level1_accessible);
        assert_eq!(p.next_step, Some(NextStep::CompleteAssistanceLevel3));

        p.complete_level(3, Utc::now());
        assert_eq!(p.manually_assigned_level, None);
        assert!(!p.override_system_flow);
    }

    #[test]
    fn override_ongoing_resets_counters_but_keeps_completions() {
        let mut p = progress();
        p.record_terminal_fail(Uuid::new_v4());
        p.complete_level(1, Utc::now());
        p.record_terminal_fail(Uuid::new_v4());
        p.apply_override(OverrideStatus::Ongoing);
        assert_eq!(p.failed_attempts, 0);
        assert_eq!(p.final_status, None);
        assert!(p.level1_completed);
        assert_eq!(p.next_step, Some(NextStep::TakeMainQuizNow));
        assert!(!p.level2_accessible);
    }

    #[test]
    fn override_failed_is_terminal() {
        let mut p = progress();
        p.apply_override(OverrideStatus::Failed);
        assert_eq!(p.failed_attempts, MAX_FAILED_ATTEMPTS);
        assert_eq!(p.next_step, Some(NextStep::QuizFailedMaxAttempts));
        assert!(!p.can_take_main_quiz);
    }
}
