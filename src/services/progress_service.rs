use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::progress::StudentQuizProgress;

/// Sole reader/writer of `student_quiz_progress` rows, the per-(student,
/// quiz) coordination point behind every routing decision. Mutations go
/// through `lock` + `store` inside one transaction so concurrent
/// submissions from the same student serialize on the row instead of
/// racing read-modify-write.
#[derive(Clone)]
pub struct ProgressService {
    pool: PgPool,
}

impl ProgressService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        student_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<Option<StudentQuizProgress>> {
        let row = sqlx::query_as::<_, StudentQuizProgress>(
            r#"SELECT * FROM student_quiz_progress WHERE student_id = $1 AND quiz_id = $2"#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Progress is created lazily on the student's first attempt or first
    /// status check. The insert is conflict-free so two concurrent first
    /// touches both end up reading the same single row.
    pub async fn ensure(&self, student_id: Uuid, quiz_id: Uuid) -> Result<StudentQuizProgress> {
        sqlx::query(
            r#"
            INSERT INTO student_quiz_progress (student_id, quiz_id)
            VALUES ($1, $2)
            ON CONFLICT (student_id, quiz_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, StudentQuizProgress>(
            r#"SELECT * FROM student_quiz_progress WHERE student_id = $1 AND quiz_id = $2"#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Upsert-then-lock inside the caller's transaction. The row lock is
    /// what makes `failed_attempts` and attempt numbering safe against a
    /// double submit from two tabs.
    pub async fn lock(
        conn: &mut PgConnection,
        student_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<StudentQuizProgress> {
        sqlx::query(
            r#"
            INSERT INTO student_quiz_progress (student_id, quiz_id)
            VALUES ($1, $2)
            ON CONFLICT (student_id, quiz_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query_as::<_, StudentQuizProgress>(
            r#"
            SELECT * FROM student_quiz_progress
            WHERE student_id = $1 AND quiz_id = $2
            FOR UPDATE
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Write back the coordination fields of a locked row.
    pub async fn store(
        conn: &mut PgConnection,
        progress: &StudentQuizProgress,
    ) -> Result<StudentQuizProgress> {
        let row = sqlx::query_as::<_, StudentQuizProgress>(
            r#"
            UPDATE student_quiz_progress
            SET current_attempt = $1,
                failed_attempts = $2,
                last_attempt_passed = $3,
                final_status = $4,
                level1_completed = $5,
                level2_completed = $6,
                level3_completed = $7,
                level1_completed_at = $8,
                level2_completed_at = $9,
                level3_completed_at = $10,
                level1_accessible = $11,
                level2_accessible = $12,
                level3_accessible = $13,
                must_retake_main_quiz = $14,
                can_take_main_quiz = $15,
                next_step = $16,
                last_submission_id = $17,
                manually_assigned_level = $18,
                override_system_flow = $19,
                updated_at = NOW()
            WHERE id = $20
            RETURNING *
            "#,
        )
        .bind(progress.current_attempt)
        .bind(progress.failed_attempts)
        .bind(progress.last_attempt_passed)
        .bind(progress.final_status)
        .bind(progress.level1_completed)
        .bind(progress.level2_completed)
        .bind(progress.level3_completed)
        .bind(progress.level1_completed_at)
        .bind(progress.level2_completed_at)
        .bind(progress.level3_completed_at)
        .bind(progress.level1_accessible)
        .bind(progress.level2_accessible)
        .bind(progress.level3_accessible)
        .bind(progress.must_retake_main_quiz)
        .bind(progress.can_take_main_quiz)
        .bind(progress.next_step)
        .bind(progress.last_submission_id)
        .bind(progress.manually_assigned_level)
        .bind(progress.override_system_flow)
        .bind(progress.id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }
}
