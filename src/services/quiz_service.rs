use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::dto::teacher_dto::{
    CreateLevel1Payload, CreateLevel2Payload, CreateLevel3Payload, CreateQuestionPayload,
    CreateQuizPayload, UpdateQuizPayload,
};
use crate::error::{Error, Result};
use crate::models::assistance::{AssistanceLevel1, AssistanceLevel2, AssistanceLevel3, RecapQuestion};
use crate::models::question::Question;
use crate::models::quiz::Quiz;
use crate::models::user::AuthContext;

#[derive(Debug, Serialize)]
pub struct QuizWithQuestions {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

/// Student-facing view of a question: the expected answer never leaves
/// the server.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub text: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuizView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<QuestionView>,
}

/// Teacher authoring of quizzes, questions and the per-quiz assistance
/// content. A quiz is immutable from the student's point of view; edits
/// are a teacher concern and replace the question set wholesale.
#[derive(Clone)]
pub struct QuizService {
    pool: PgPool,
}

impl QuizService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_quiz(
        &self,
        auth: &AuthContext,
        payload: CreateQuizPayload,
    ) -> Result<QuizWithQuestions> {
        payload.validate()?;
        self.assert_owns_class(auth, payload.class_id).await?;

        let mut tx = self.pool.begin().await?;
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes (class_id, title, description, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(payload.class_id)
        .bind(payload.title.trim())
        .bind(&payload.description)
        .bind(auth.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let questions = Self::insert_questions(&mut tx, quiz.id, &payload.questions).await?;
        tx.commit().await?;

        tracing::info!(quiz_id = %quiz.id, teacher_id = %auth.user_id, "Quiz created");
        Ok(QuizWithQuestions { quiz, questions })
    }

    pub async fn update_quiz(
        &self,
        auth: &AuthContext,
        quiz_id: Uuid,
        payload: UpdateQuizPayload,
    ) -> Result<QuizWithQuestions> {
        payload.validate()?;
        self.assert_owns_quiz(auth, quiz_id).await?;

        let mut tx = self.pool.begin().await?;
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            UPDATE quizzes
            SET title = COALESCE($1, title),
                description = COALESCE($2, description),
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(quiz_id)
        .fetch_one(&mut *tx)
        .await?;

        let questions = match payload.questions {
            Some(new_questions) => {
                sqlx::query(r#"DELETE FROM questions WHERE quiz_id = $1"#)
                    .bind(quiz_id)
                    .execute(&mut *tx)
                    .await?;
                Self::insert_questions(&mut tx, quiz_id, &new_questions).await?
            }
            None => {
                sqlx::query_as::<_, Question>(
                    r#"SELECT * FROM questions WHERE quiz_id = $1 ORDER BY ordinal, id"#,
                )
                .bind(quiz_id)
                .fetch_all(&mut *tx)
                .await?
            }
        };
        tx.commit().await?;

        Ok(QuizWithQuestions { quiz, questions })
    }

    pub async fn get_quiz(&self, auth: &AuthContext, quiz_id: Uuid) -> Result<QuizWithQuestions> {
        self.assert_owns_quiz(auth, quiz_id).await?;
        let quiz = self.fetch_quiz(quiz_id).await?;
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE quiz_id = $1 ORDER BY ordinal, id"#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(QuizWithQuestions { quiz, questions })
    }

    /// The quiz as a student sees it before answering: no expected answers.
    pub async fn get_quiz_for_student(&self, quiz_id: Uuid) -> Result<QuizView> {
        let quiz = self.fetch_quiz(quiz_id).await?;
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE quiz_id = $1 ORDER BY ordinal, id"#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(QuizView {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            questions: questions
                .into_iter()
                .map(|q| QuestionView {
                    id: q.id,
                    text: q.text,
                    image_url: q.image_url,
                })
                .collect(),
        })
    }

    pub async fn list_quizzes(&self, auth: &AuthContext, class_id: Uuid) -> Result<Vec<Quiz>> {
        self.assert_owns_class(auth, class_id).await?;
        let quizzes = sqlx::query_as::<_, Quiz>(
            r#"SELECT * FROM quizzes WHERE class_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(quizzes)
    }

    pub async fn delete_quiz(&self, auth: &AuthContext, quiz_id: Uuid) -> Result<bool> {
        self.assert_owns_quiz(auth, quiz_id).await?;
        let result = sqlx::query(r#"DELETE FROM quizzes WHERE id = $1"#)
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_level1(
        &self,
        auth: &AuthContext,
        quiz_id: Uuid,
        payload: CreateLevel1Payload,
    ) -> Result<AssistanceLevel1> {
        payload.validate()?;
        self.assert_owns_quiz(auth, quiz_id).await?;
        for question in &payload.questions {
            let options = question.options.len() as i32;
            if !(0..options).contains(&question.correct_option) {
                return Err(Error::BadRequest(format!(
                    "correct_option {} is out of range for {} options",
                    question.correct_option, options
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        let assistance = sqlx::query_as::<_, AssistanceLevel1>(
            r#"
            INSERT INTO assistance_level1 (quiz_id, title)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(quiz_id)
        .bind(payload.title.trim())
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::map_duplicate)?;

        for (ordinal, question) in payload.questions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO assistance_level1_questions
                    (assistance_id, text, options, correct_option, ordinal)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(assistance.id)
            .bind(question.text.trim())
            .bind(serde_json::to_value(&question.options)?)
            .bind(question.correct_option)
            .bind(ordinal as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(assistance)
    }

    pub async fn create_level2(
        &self,
        auth: &AuthContext,
        quiz_id: Uuid,
        payload: CreateLevel2Payload,
    ) -> Result<AssistanceLevel2> {
        payload.validate()?;
        self.assert_owns_quiz(auth, quiz_id).await?;
        let assistance = sqlx::query_as::<_, AssistanceLevel2>(
            r#"
            INSERT INTO assistance_level2 (quiz_id, prompt, material_url)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(quiz_id)
        .bind(payload.prompt.trim())
        .bind(payload.material_url)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_duplicate)?;
        Ok(assistance)
    }

    pub async fn create_level3(
        &self,
        auth: &AuthContext,
        quiz_id: Uuid,
        payload: CreateLevel3Payload,
    ) -> Result<AssistanceLevel3> {
        payload.validate()?;
        self.assert_owns_quiz(auth, quiz_id).await?;
        if url::Url::parse(&payload.material_url).is_err()
            && !payload.material_url.starts_with('/')
        {
            return Err(Error::BadRequest(
                "material_url must be an absolute URL or an upload path".to_string(),
            ));
        }
        let assistance = sqlx::query_as::<_, AssistanceLevel3>(
            r#"
            INSERT INTO assistance_level3 (quiz_id, title, material_url)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(quiz_id)
        .bind(payload.title.trim())
        .bind(&payload.material_url)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_duplicate)?;
        Ok(assistance)
    }

    /// Level definitions as the student consumes them. Level 1 questions
    /// are returned without the correct option index.
    pub async fn get_level1_for_student(
        &self,
        quiz_id: Uuid,
    ) -> Result<(AssistanceLevel1, Vec<serde_json::Value>)> {
        let assistance = sqlx::query_as::<_, AssistanceLevel1>(
            r#"SELECT * FROM assistance_level1 WHERE quiz_id = $1"#,
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("No level 1 assistance for this quiz".to_string()))?;

        let questions = sqlx::query_as::<_, RecapQuestion>(
            r#"SELECT * FROM assistance_level1_questions WHERE assistance_id = $1 ORDER BY ordinal, id"#,
        )
        .bind(assistance.id)
        .fetch_all(&self.pool)
        .await?;
        let views = questions
            .into_iter()
            .map(|q| {
                serde_json::json!({
                    "id": q.id,
                    "text": q.text,
                    "options": q.options.0,
                })
            })
            .collect();
        Ok((assistance, views))
    }

    pub async fn get_level2(&self, quiz_id: Uuid) -> Result<AssistanceLevel2> {
        sqlx::query_as::<_, AssistanceLevel2>(
            r#"SELECT * FROM assistance_level2 WHERE quiz_id = $1"#,
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("No level 2 assistance for this quiz".to_string()))
    }

    pub async fn get_level3(&self, quiz_id: Uuid) -> Result<AssistanceLevel3> {
        sqlx::query_as::<_, AssistanceLevel3>(
            r#"SELECT * FROM assistance_level3 WHERE quiz_id = $1"#,
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("No level 3 assistance for this quiz".to_string()))
    }

    async fn insert_questions(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        quiz_id: Uuid,
        payloads: &[CreateQuestionPayload],
    ) -> Result<Vec<Question>> {
        let mut questions = Vec::with_capacity(payloads.len());
        for (ordinal, payload) in payloads.iter().enumerate() {
            let question = sqlx::query_as::<_, Question>(
                r#"
                INSERT INTO questions (quiz_id, text, expected_answer, image_url, ordinal)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(quiz_id)
            .bind(payload.text.trim())
            .bind(&payload.expected_answer)
            .bind(&payload.image_url)
            .bind(ordinal as i32)
            .fetch_one(&mut **tx)
            .await?;
            questions.push(question);
        }
        Ok(questions)
    }

    fn map_duplicate(err: sqlx::Error) -> Error {
        if let sqlx::Error::Database(ref db) = err {
            if db.code().as_deref() == Some("23505") {
                return Error::BadRequest(
                    "This quiz already has assistance content at that level".to_string(),
                );
            }
        }
        err.into()
    }

    async fn assert_owns_class(&self, auth: &AuthContext, class_id: Uuid) -> Result<()> {
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
            return Err(Error::Forbidden(
                "You do not own this class".to_string(),
            ));
        }
        Ok(())
    }

    async fn assert_owns_quiz(&self, auth: &AuthContext, quiz_id: Uuid) -> Result<()> {
        if !auth.is_teacher() {
            return Err(Error::Forbidden("Teacher role required".to_string()));
        }
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
        .bind(auth.user_id)
        .fetch_one(&self.pool)
        .await?;
        if !owns {
            return Err(Error::Forbidden("You do not own this quiz".to_string()));
        }
        Ok(())
    }

    async fn fetch_quiz(&self, quiz_id: Uuid) -> Result<Quiz> {
        sqlx::query_as::<_, Quiz>(r#"SELECT * FROM quizzes WHERE id = $1"#)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Quiz not found".to_string()))
    }
}
