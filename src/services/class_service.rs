use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::dto::teacher_dto::CreateClassPayload;
use crate::error::{Error, Result};
use crate::models::class::Class;
use crate::models::user::{AuthContext, UserRole};

#[derive(Clone)]
pub struct ClassService {
    pool: PgPool,
}

impl ClassService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_class(
        &self,
        auth: &AuthContext,
        payload: CreateClassPayload,
    ) -> Result<Class> {
        payload.validate()?;
        if !auth.is_teacher() {
            return Err(Error::Forbidden("Teacher role required".to_string()));
        }
        let class = sqlx::query_as::<_, Class>(
            r#"
            INSERT INTO classes (name, description, teacher_id)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(payload.name.trim())
        .bind(&payload.description)
        .bind(auth.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(class)
    }

    pub async fn list_classes(&self, auth: &AuthContext) -> Result<Vec<Class>> {
        let classes = match auth.role {
            UserRole::Teacher => {
                sqlx::query_as::<_, Class>(
                    r#"SELECT * FROM classes WHERE teacher_id = $1 ORDER BY created_at DESC"#,
                )
                .bind(auth.user_id)
                .fetch_all(&self.pool)
                .await?
            }
            UserRole::Student => {
                sqlx::query_as::<_, Class>(
                    r#"
                    SELECT c.*
                    FROM classes c
                    JOIN class_students cs ON cs.class_id = c.id
                    WHERE cs.student_id = $1
                    ORDER BY c.created_at DESC
                    "#,
                )
                .bind(auth.user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(classes)
    }

    pub async fn enroll_student(
        &self,
        auth: &AuthContext,
        class_id: Uuid,
        student_id: Uuid,
    ) -> Result<()> {
        if !auth.is_teacher() {
            return Err(Error::Forbidden("Teacher role required".to_string()));
        }
        let owns: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM classes WHERE id = $1 AND teacher_id = $2)"#,
        )
        .bind(class_id)
        .bind(auth.user_id)
        .fetch_one(&self.pool)
        .await?;
        if !owns {
            return Err(Error::Forbidden("You do not own this class".to_string()));
        }

        let is_student: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND role = 'student' AND is_active)"#,
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        if !is_student {
            return Err(Error::BadRequest(
                "The given user is not an active student".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO class_students (class_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (class_id, student_id) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
