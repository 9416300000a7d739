use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::dto::teacher_dto::{
    AssignLevelRequest, GradeSubmissionRequest, GradeSubmissionResponse, OverrideStatusRequest,
};
use crate::error::{Error, Result};
use crate::models::progress::StudentQuizProgress;
use crate::models::submission::{QuizSubmission, SubmissionAnswer, SubmissionStatus, Verdict};
use crate::models::user::AuthContext;
use crate::services::audit_service::AuditService;
use crate::services::grading_service::GradingService;
use crate::services::progress_service::ProgressService;

#[derive(Debug, serde::Serialize)]
pub struct PaginatedSubmissions {
    pub items: Vec<QuizSubmission>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Teacher-side grading and flow overrides. Teacher scores and feedback
/// are additive on top of the auto-grade: the original verdicts stay
/// untouched as an audit trail, and reconciliation can only upgrade a
/// submission, never downgrade one the auto-grader already passed.
#[derive(Clone)]
pub struct ReviewService {
    pool: PgPool,
}

impl ReviewService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn grade_submission(
        &self,
        auth: &AuthContext,
        submission_id: Uuid,
        req: GradeSubmissionRequest,
    ) -> Result<GradeSubmissionResponse> {
        req.validate()?;
        if !auth.is_teacher() {
            return Err(Error::Forbidden(
                "Only teachers can grade submissions".to_string(),
            ));
        }
        for grade in &req.grades {
            if !(0..=100).contains(&grade.score) {
                return Err(Error::BadRequest(format!(
                    "Score for question {} must be between 0 and 100",
                    grade.question_id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        let submission = sqlx::query_as::<_, QuizSubmission>(
            r#"SELECT * FROM quiz_submissions WHERE id = $1 FOR UPDATE"#,
        )
        .bind(submission_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Submission not found".to_string()))?;
        self.assert_owns_quiz(&mut tx, auth.user_id, submission.quiz_id)
            .await?;

        let answers = sqlx::query_as::<_, SubmissionAnswer>(
            r#"SELECT * FROM submission_answers WHERE submission_id = $1"#,
        )
        .bind(submission_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut matched = 0;
        let mut unknown: Vec<Uuid> = Vec::new();
        for grade in &req.grades {
            let Some(answer) = answers.iter().find(|a| a.question_id == grade.question_id) else {
                unknown.push(grade.question_id);
                continue;
            };
            // Only the teacher fields move; is_correct is frozen.
            sqlx::query(
                r#"UPDATE submission_answers SET score = $1, feedback = $2 WHERE id = $3"#,
            )
            .bind(grade.score)
            .bind(&grade.feedback)
            .bind(answer.id)
            .execute(&mut *tx)
            .await?;
            matched += 1;
        }
        if matched == 0 {
            return Err(Error::GradingInconsistency(
                "None of the graded question ids belong to this submission".to_string(),
            ));
        }
        if !unknown.is_empty() {
            // The matching grades still apply; the mismatch is reported,
            // not swallowed.
            tracing::warn!(
                submission_id = %submission_id,
                unknown = ?unknown,
                "Teacher grades referenced questions outside the submission"
            );
        }

        let answers = sqlx::query_as::<_, SubmissionAnswer>(
            r#"SELECT * FROM submission_answers WHERE submission_id = $1"#,
        )
        .bind(submission_id)
        .fetch_all(&mut *tx)
        .await?;
        let teacher_scores: Vec<i32> = answers.iter().map(|a| a.score.unwrap_or(0)).collect();
        let verdicts: Vec<Verdict> = answers.iter().map(SubmissionAnswer::verdict).collect();
        let reconciliation = GradingService::reconcile(&teacher_scores, &verdicts);

        let was_pending = submission.status == SubmissionStatus::Pending;
        let status = if reconciliation.passed {
            SubmissionStatus::Passed
        } else {
            SubmissionStatus::Failed
        };
        let submission = sqlx::query_as::<_, QuizSubmission>(
            r#"
            UPDATE quiz_submissions
            SET status = $1, score = $2, feedback = COALESCE($3, feedback)
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(reconciliation.teacher_percentage)
        .bind(&req.feedback)
        .bind(submission_id)
        .fetch_one(&mut *tx)
        .await?;

        if reconciliation.passed {
            // Teacher grading can retroactively clear the quiz.
            let mut progress =
                ProgressService::lock(&mut tx, submission.student_id, submission.quiz_id).await?;
            progress.pass_via_grading();
            ProgressService::store(&mut tx, &progress).await?;
        } else if was_pending {
            // The pending attempt is now a terminal failure; it consumes a
            // failed attempt exactly once. A quiz the student has since
            // passed stays passed.
            let mut progress =
                ProgressService::lock(&mut tx, submission.student_id, submission.quiz_id).await?;
            if !progress.has_passed() {
                progress.fail_via_grading();
                ProgressService::store(&mut tx, &progress).await?;
            }
        }
        tx.commit().await?;

        let audit = AuditService::new(self.pool.clone());
        let _ = audit
            .log(
                Some(auth.user_id),
                "grade_submission",
                "quiz_submission",
                submission_id,
                Some(json!({
                    "teacher_percentage": reconciliation.teacher_percentage,
                    "auto_correct_percentage": reconciliation.auto_correct_percentage,
                    "passed": reconciliation.passed,
                })),
                None,
                None,
            )
            .await?;

        Ok(GradeSubmissionResponse {
            submission_id,
            status: submission.status,
            score: reconciliation.teacher_percentage,
            teacher_percentage: reconciliation.teacher_percentage,
            auto_correct_percentage: reconciliation.auto_correct_percentage,
            passed: reconciliation.passed,
        })
    }

    /// Force a student's progress into PASSED / FAILED / ONGOING,
    /// bypassing the normal flow.
    pub async fn override_student_status(
        &self,
        auth: &AuthContext,
        student_id: Uuid,
        quiz_id: Uuid,
        req: OverrideStatusRequest,
    ) -> Result<StudentQuizProgress> {
        if !auth.is_teacher() {
            return Err(Error::Forbidden(
                "Only teachers can override student status".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        self.assert_owns_quiz(&mut tx, auth.user_id, quiz_id).await?;
        let mut progress = ProgressService::lock(&mut tx, student_id, quiz_id).await?;
        progress.apply_override(req.status);
        let progress = ProgressService::store(&mut tx, &progress).await?;
        tx.commit().await?;

        let audit = AuditService::new(self.pool.clone());
        let _ = audit
            .log(
                Some(auth.user_id),
                "override_student_status",
                "student_quiz_progress",
                progress.id,
                Some(json!({ "forced_status": req.status })),
                None,
                None,
            )
            .await?;

        Ok(progress)
    }

    /// Route a student into a specific assistance level by hand. Takes
    /// strict precedence over the threshold-derived accessibility until
    /// the assigned level is completed.
    pub async fn assign_assistance_level(
        &self,
        auth: &AuthContext,
        student_id: Uuid,
        quiz_id: Uuid,
        req: AssignLevelRequest,
    ) -> Result<StudentQuizProgress> {
        req.validate()?;
        if !auth.is_teacher() {
            return Err(Error::Forbidden(
                "Only teachers can assign assistance levels".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        self.assert_owns_quiz(&mut tx, auth.user_id, quiz_id).await?;
        let mut progress = ProgressService::lock(&mut tx, student_id, quiz_id).await?;
        progress.assign_level(req.level as u8);
        let progress = ProgressService::store(&mut tx, &progress).await?;
        tx.commit().await?;

        let audit = AuditService::new(self.pool.clone());
        let _ = audit
            .log(
                Some(auth.user_id),
                "assign_assistance_level",
                "student_quiz_progress",
                progress.id,
                Some(json!({ "level": req.level })),
                None,
                None,
            )
            .await?;

        Ok(progress)
    }

    /// Review queue: PENDING submissions across the teacher's quizzes.
    pub async fn list_pending_submissions(
        &self,
        auth: &AuthContext,
        page: i64,
        per_page: i64,
    ) -> Result<PaginatedSubmissions> {
        if !auth.is_teacher() {
            return Err(Error::Forbidden(
                "Only teachers can list the review queue".to_string(),
            ));
        }
        let offset = (page - 1).max(0) * per_page;

        let items = sqlx::query_as::<_, QuizSubmission>(
            r#"
            SELECT s.*
            FROM quiz_submissions s
            JOIN quizzes q ON q.id = s.quiz_id
            JOIN classes c ON c.id = q.class_id
            WHERE c.teacher_id = $1 AND s.status = 'PENDING'
            ORDER BY s.created_at
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(auth.user_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM quiz_submissions s
            JOIN quizzes q ON q.id = s.quiz_id
            JOIN classes c ON c.id = q.class_id
            WHERE c.teacher_id = $1 AND s.status = 'PENDING'
            "#,
        )
        .bind(auth.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PaginatedSubmissions {
            items,
            total,
            page,
            per_page,
        })
    }

    pub async fn get_submission(
        &self,
        auth: &AuthContext,
        submission_id: Uuid,
    ) -> Result<(QuizSubmission, Vec<SubmissionAnswer>)> {
        let submission = sqlx::query_as::<_, QuizSubmission>(
            r#"SELECT * FROM quiz_submissions WHERE id = $1"#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Submission not found".to_string()))?;

        if auth.is_teacher() {
            let mut conn = self.pool.acquire().await?;
            self.assert_owns_quiz(&mut conn, auth.user_id, submission.quiz_id)
                .await?;
        } else if submission.student_id != auth.user_id {
            return Err(Error::Forbidden(
                "You can only view your own submissions".to_string(),
            ));
        }

        let answers = sqlx::query_as::<_, SubmissionAnswer>(
            r#"SELECT * FROM submission_answers WHERE submission_id = $1"#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;
        Ok((submission, answers))
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
                "You do not own this quiz".to_string(),
            ));
        }
        Ok(())
    }
}
