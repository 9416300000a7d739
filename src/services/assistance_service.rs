use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::dto::student_dto::{
    CompleteLevel3Request, CompleteLevel3Response, SubmitLevel1Request, SubmitLevel1Response,
    SubmitLevel2Request, SubmitLevel2Response,
};
use crate::dto::teacher_dto::ApproveLevel2Request;
use crate::error::{Error, Result};
use crate::models::assistance::{
    AssistanceLevel1, AssistanceLevel2, AssistanceLevel3, Level1Submission, Level2Submission,
    Level3Completion, RecapQuestion,
};
use crate::models::progress::NextStep;
use crate::models::submission::SubmissionStatus;
use crate::models::user::AuthContext;
use crate::services::grading_service::GradingService;
use crate::services::progress_service::ProgressService;

/// The three per-level completion handlers. Each one records the
/// level-specific submission/completion row and, on a passing outcome,
/// flips the progress record to "retake the main quiz" in the same
/// transaction.
#[derive(Clone)]
pub struct AssistanceService {
    pool: PgPool,
}

impl AssistanceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Level 1: multiple-choice recap, completed only at 100% correct.
    pub async fn submit_level1(
        &self,
        auth: &AuthContext,
        assistance_id: Uuid,
        req: SubmitLevel1Request,
    ) -> Result<SubmitLevel1Response> {
        req.validate()?;
        if !auth.is_student() {
            return Err(Error::Forbidden(
                "Only students can submit assistance exercises".to_string(),
            ));
        }

        let assistance = sqlx::query_as::<_, AssistanceLevel1>(
            r#"SELECT * FROM assistance_level1 WHERE id = $1"#,
        )
        .bind(assistance_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Assistance exercise not found".to_string()))?;
        self.assert_enrolled_for_quiz(auth.user_id, assistance.quiz_id)
            .await?;

        let questions = sqlx::query_as::<_, RecapQuestion>(
            r#"SELECT * FROM assistance_level1_questions WHERE assistance_id = $1 ORDER BY ordinal, id"#,
        )
        .bind(assistance_id)
        .fetch_all(&self.pool)
        .await?;

        let outcome = GradingService::grade_recap(&questions, &req.answers);

        let mut tx = self.pool.begin().await?;
        let submission = sqlx::query_as::<_, Level1Submission>(
            r#"
            INSERT INTO assistance_level1_submissions
                (assistance_id, student_id, answers, correct_answers, total_questions, passed)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(assistance_id)
        .bind(auth.user_id)
        .bind(serde_json::to_value(&req.answers)?)
        .bind(outcome.correct_count)
        .bind(outcome.total_questions)
        .bind(outcome.passed)
        .fetch_one(&mut *tx)
        .await?;

        let next_action = if outcome.passed {
            let mut progress =
                ProgressService::lock(&mut tx, auth.user_id, assistance.quiz_id).await?;
            progress.complete_level(1, Utc::now());
            let progress = ProgressService::store(&mut tx, &progress).await?;
            progress.next_step
        } else {
            Some(NextStep::CompleteAssistanceLevel1)
        };
        tx.commit().await?;

        tracing::info!(
            assistance_id = %assistance_id,
            student_id = %auth.user_id,
            correct = outcome.correct_count,
            total = outcome.total_questions,
            passed = outcome.passed,
            "Level 1 recap submitted"
        );

        Ok(SubmitLevel1Response {
            submission_id: submission.id,
            correct_answers: outcome.correct_count,
            total_questions: outcome.total_questions,
            passed: outcome.passed,
            next_action,
        })
    }

    /// Level 2: essay submission. Stays PENDING until a teacher approves;
    /// only approval flips the progress flags.
    pub async fn submit_level2(
        &self,
        auth: &AuthContext,
        assistance_id: Uuid,
        req: SubmitLevel2Request,
    ) -> Result<SubmitLevel2Response> {
        req.validate()?;
        if !auth.is_student() {
            return Err(Error::Forbidden(
                "Only students can submit assistance exercises".to_string(),
            ));
        }

        let assistance = sqlx::query_as::<_, AssistanceLevel2>(
            r#"SELECT * FROM assistance_level2 WHERE id = $1"#,
        )
        .bind(assistance_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Assistance exercise not found".to_string()))?;
        self.assert_enrolled_for_quiz(auth.user_id, assistance.quiz_id)
            .await?;

        let submission = sqlx::query_as::<_, Level2Submission>(
            r#"
            INSERT INTO assistance_level2_submissions
                (assistance_id, student_id, essay_text, file_url)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(assistance_id)
        .bind(auth.user_id)
        .bind(req.essay_text.trim())
        .bind(req.file_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(SubmitLevel2Response {
            submission_id: submission.id,
            status: SubmissionStatus::Pending,
            message: "Essay submitted; waiting for teacher review".to_string(),
        })
    }

    /// Teacher verdict on a level-2 essay. Approval completes the level.
    pub async fn approve_level2(
        &self,
        auth: &AuthContext,
        submission_id: Uuid,
        req: ApproveLevel2Request,
    ) -> Result<Level2Submission> {
        if !auth.is_teacher() {
            return Err(Error::Forbidden(
                "Only teachers can review essays".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let submission = sqlx::query_as::<_, Level2Submission>(
            r#"SELECT * FROM assistance_level2_submissions WHERE id = $1 FOR UPDATE"#,
        )
        .bind(submission_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Essay submission not found".to_string()))?;

        let quiz_id: Uuid =
            sqlx::query_scalar(r#"SELECT quiz_id FROM assistance_level2 WHERE id = $1"#)
                .bind(submission.assistance_id)
                .fetch_one(&mut *tx)
                .await?;
        self.assert_owns_quiz(&mut tx, auth.user_id, quiz_id).await?;

        let updated = sqlx::query_as::<_, Level2Submission>(
            r#"
            UPDATE assistance_level2_submissions
            SET is_approved = $1,
                teacher_feedback = $2,
                reviewed_by = $3,
                reviewed_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(req.approved)
        .bind(req.feedback)
        .bind(auth.user_id)
        .bind(submission_id)
        .fetch_one(&mut *tx)
        .await?;

        if req.approved {
            let mut progress =
                ProgressService::lock(&mut tx, submission.student_id, quiz_id).await?;
            progress.complete_level(2, Utc::now());
            ProgressService::store(&mut tx, &progress).await?;
        }
        tx.commit().await?;

        tracing::info!(
            submission_id = %submission_id,
            approved = req.approved,
            "Level 2 essay reviewed"
        );
        Ok(updated)
    }

    /// Level 3: confirmation-only completion. Idempotent: a repeat call
    /// refreshes the reading-time telemetry and nothing else.
    pub async fn complete_level3(
        &self,
        auth: &AuthContext,
        assistance_id: Uuid,
        req: CompleteLevel3Request,
    ) -> Result<CompleteLevel3Response> {
        req.validate()?;
        if !auth.is_student() {
            return Err(Error::Forbidden(
                "Only students can confirm assistance reading".to_string(),
            ));
        }

        let assistance = sqlx::query_as::<_, AssistanceLevel3>(
            r#"SELECT * FROM assistance_level3 WHERE id = $1"#,
        )
        .bind(assistance_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Assistance material not found".to_string()))?;
        self.assert_enrolled_for_quiz(auth.user_id, assistance.quiz_id)
            .await?;

        let mut tx = self.pool.begin().await?;
        let _completion = sqlx::query_as::<_, Level3Completion>(
            r#"
            INSERT INTO assistance_level3_completions
                (assistance_id, student_id, read_confirmed, reading_time_seconds)
            VALUES ($1, $2, TRUE, $3)
            ON CONFLICT (assistance_id, student_id) DO UPDATE
            SET reading_time_seconds = COALESCE(
                    EXCLUDED.reading_time_seconds,
                    assistance_level3_completions.reading_time_seconds
                ),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(assistance_id)
        .bind(auth.user_id)
        .bind(req.reading_time_seconds)
        .fetch_one(&mut *tx)
        .await?;

        let mut progress = ProgressService::lock(&mut tx, auth.user_id, assistance.quiz_id).await?;
        progress.complete_level(3, Utc::now());
        let progress = ProgressService::store(&mut tx, &progress).await?;
        tx.commit().await?;

        Ok(CompleteLevel3Response {
            completed: true,
            next_action: progress.next_step,
        })
    }

    async fn assert_enrolled_for_quiz(&self, student_id: Uuid, quiz_id: Uuid) -> Result<()> {
        let enrolled: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM quizzes q
                JOIN class_students cs ON cs.class_id = q.class_id
                WHERE q.id = $1 AND cs.student_id = $2
            )
            "#,
        )
        .bind(quiz_id)
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

    async fn assert_owns_quiz(
        &self,
        conn: &mut sqlx::PgConnection,
        teacher_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<()> {
        let owns: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM quizzes q
                JOIN classes c ON c.id = q.class_id
                WHERE q.id = $1 AND c.teacher_id = $2
            )
            "#,
        )
        .bind(quiz_id)
        .bind(teacher_id)
        .fetch_one(&mut *conn)
        .await?;
        if !owns {
            return Err(Error::Forbidden(
                "You do not own the quiz this assistance belongs to".to_string(),
            ));
        }
        Ok(())
    }
}
