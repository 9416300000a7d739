use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::dto::student_dto::{QuizStatusResponse, SubmitQuizRequest, SubmitQuizResponse};
use crate::error::{is_serialization_failure, Error, Result};
use crate::models::progress::MAX_FAILED_ATTEMPTS;
use crate::models::question::Question;
use crate::models::quiz::Quiz;
use crate::models::submission::{QuizSubmission, SubmissionStatus};
use crate::models::user::AuthContext;
use crate::services::access_gate::AccessGate;
use crate::services::grading_service::{AutoGradeOutcome, GradingService};
use crate::services::progress_service::ProgressService;

/// Orchestrates a main-quiz attempt: auto-grade, persist the submission
/// with its answers, and advance the progress state machine, all in one
/// transaction so the access gate never sees a half-applied attempt.
#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
}

impl AttemptService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn submit_main_quiz(
        &self,
        auth: &AuthContext,
        quiz_id: Uuid,
        req: SubmitQuizRequest,
    ) -> Result<SubmitQuizResponse> {
        req.validate()?;
        if !auth.is_student() {
            return Err(Error::Forbidden(
                "Only students can submit quizzes".to_string(),
            ));
        }

        let quiz = self.fetch_quiz(quiz_id).await?;
        self.assert_enrolled(auth.user_id, quiz.class_id).await?;

        let questions = self.fetch_questions(quiz_id).await?;
        let outcome = GradingService::grade_main_quiz(&questions, &req.answers);
        if !outcome.unmatched_question_ids.is_empty() {
            tracing::warn!(
                quiz_id = %quiz_id,
                student_id = %auth.user_id,
                unmatched = ?outcome.unmatched_question_ids,
                "Submission carried answers for questions not in this quiz"
            );
        }

        // The row lock on progress serializes concurrent submits; a
        // serialization failure or deadlock gets one automatic retry.
        match self.persist_attempt(auth.user_id, quiz_id, &outcome).await {
            Err(ref e) if is_serialization_failure(e) => {
                tracing::warn!(
                    quiz_id = %quiz_id,
                    student_id = %auth.user_id,
                    "Retrying submission after serialization conflict"
                );
                self.persist_attempt(auth.user_id, quiz_id, &outcome)
                    .await
                    .map_err(|e| {
                        if is_serialization_failure(&e) {
                            Error::ConcurrencyConflict(
                                "A concurrent submission is in flight; please retry".to_string(),
                            )
                        } else {
                            e
                        }
                    })
            }
            other => other,
        }
    }

    async fn persist_attempt(
        &self,
        student_id: Uuid,
        quiz_id: Uuid,
        outcome: &AutoGradeOutcome,
    ) -> Result<SubmitQuizResponse> {
        let mut tx = self.pool.begin().await?;

        let mut progress = ProgressService::lock(&mut tx, student_id, quiz_id).await?;
        // The gate runs under the same lock that the write will use, so
        // the decision cannot go stale before the attempt lands.
        let gate = AccessGate::can_take_main_quiz(&progress);
        if !gate.allow {
            let reason = gate
                .reason
                .unwrap_or_else(|| "Quiz is not available".to_string());
            return Err(
                if progress.has_passed() || progress.failed_attempts >= MAX_FAILED_ATTEMPTS {
                    Error::AttemptLimitExceeded(reason)
                } else {
                    Error::Forbidden(reason)
                },
            );
        }

        // Assigned under the progress row lock, so numbering stays
        // monotonic even for a double submit.
        let attempt_number: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(attempt_number), 0) + 1
            FROM quiz_submissions
            WHERE quiz_id = $1 AND student_id = $2
            "#,
        )
        .bind(quiz_id)
        .bind(student_id)
        .fetch_one(&mut *tx)
        .await?;

        let status = if outcome.passed() {
            SubmissionStatus::Passed
        } else if outcome.has_indeterminate {
            // Some verdicts are unknowable without a teacher; the attempt
            // is not a terminal failure.
            SubmissionStatus::Pending
        } else {
            SubmissionStatus::Failed
        };

        let submission = sqlx::query_as::<_, QuizSubmission>(
            r#"
            INSERT INTO quiz_submissions
                (quiz_id, student_id, attempt_number, status, score, correct_answers, total_questions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(quiz_id)
        .bind(student_id)
        .bind(attempt_number)
        .bind(status)
        .bind(outcome.score)
        .bind(outcome.correct_count)
        .bind(outcome.total_questions)
        .fetch_one(&mut *tx)
        .await?;

        for answer in &outcome.answers {
            sqlx::query(
                r#"
                INSERT INTO submission_answers (submission_id, question_id, answer_text, is_correct)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(submission.id)
            .bind(answer.question_id)
            .bind(&answer.answer_text)
            .bind(answer.verdict.to_db())
            .execute(&mut *tx)
            .await?;
        }

        match status {
            SubmissionStatus::Passed => progress.record_pass(submission.id),
            SubmissionStatus::Failed => progress.record_terminal_fail(submission.id),
            SubmissionStatus::Pending => progress.record_pending(submission.id),
        }
        let progress = ProgressService::store(&mut tx, &progress).await?;

        tx.commit().await?;

        tracing::info!(
            submission_id = %submission.id,
            student_id = %student_id,
            quiz_id = %quiz_id,
            attempt = attempt_number,
            score = outcome.score,
            status = ?status,
            "Main quiz submission graded"
        );

        Ok(SubmitQuizResponse {
            submission_id: submission.id,
            attempt_number,
            status,
            score: outcome.score,
            correct_answers: outcome.correct_count,
            total_questions: outcome.total_questions,
            passed: status == SubmissionStatus::Passed,
            next_action: AccessGate::next_step_for(&progress),
            unmatched_question_ids: outcome.unmatched_question_ids.clone(),
        })
    }

    /// Lazily creates the progress record on first contact, then reports
    /// counters, flags and the routing hint.
    pub async fn get_quiz_status(
        &self,
        auth: &AuthContext,
        quiz_id: Uuid,
    ) -> Result<QuizStatusResponse> {
        let quiz = self.fetch_quiz(quiz_id).await?;
        self.assert_enrolled(auth.user_id, quiz.class_id).await?;

        let progress = ProgressService::new(self.pool.clone())
            .ensure(auth.user_id, quiz_id)
            .await?;

        Ok(QuizStatusResponse {
            quiz_id,
            current_attempt: progress.current_attempt,
            failed_attempts: progress.failed_attempts,
            last_attempt_passed: progress.last_attempt_passed,
            final_status: progress.final_status,
            level1_completed: progress.level1_completed,
            level2_completed: progress.level2_completed,
            level3_completed: progress.level3_completed,
            level1_accessible: progress.level1_accessible,
            level2_accessible: progress.level2_accessible,
            level3_accessible: progress.level3_accessible,
            must_retake_main_quiz: progress.must_retake_main_quiz,
            can_take_main_quiz: progress.can_take_main_quiz,
            next_action: AccessGate::next_step_for(&progress),
            last_submission_id: progress.last_submission_id,
        })
    }

    async fn fetch_quiz(&self, quiz_id: Uuid) -> Result<Quiz> {
        let quiz = sqlx::query_as::<_, Quiz>(r#"SELECT * FROM quizzes WHERE id = $1"#)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Quiz not found".to_string()))?;
        Ok(quiz)
    }

    async fn fetch_questions(&self, quiz_id: Uuid) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE quiz_id = $1 ORDER BY ordinal, id"#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn assert_enrolled(&self, student_id: Uuid, class_id: Uuid) -> Result<()> {
        let enrolled: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM class_students WHERE class_id = $1 AND student_id = $2)"#,
        )
        .bind(class_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        if !enrolled {
            return Err(Error::Forbidden(
                "You are not enrolled in the class this quiz belongs to".to_string(),
            ));
        }
        Ok(())
    }
}
