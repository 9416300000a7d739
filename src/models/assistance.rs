use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

// Level 1: multiple-choice recap. Passes only at 100% correct.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssistanceLevel1 {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecapQuestion {
    pub id: Uuid,
    pub assistance_id: Uuid,
    pub text: String,
    pub options: sqlx::types::Json<Vec<String>>,
    pub correct_option: i32,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Level1Submission {
    pub id: Uuid,
    pub assistance_id: Uuid,
    pub student_id: Uuid,
    pub answers: JsonValue,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}

// Level 2: short essay, graded by the teacher. Counts as completed only
// once `is_approved` is set.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssistanceLevel2 {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub prompt: String,
    pub material_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Level2Submission {
    pub id: Uuid,
    pub assistance_id: Uuid,
    pub student_id: Uuid,
    pub essay_text: String,
    pub file_url: Option<String>,
    /// NULL while awaiting teacher review.
    pub is_approved: Option<bool>,
    pub teacher_feedback: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// Level 3: reference reading. Completion is a student confirmation, no
// correctness check.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssistanceLevel3 {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub title: String,
    pub material_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Level3Completion {
    pub id: Uuid,
    pub assistance_id: Uuid,
    pub student_id: Uuid,
    pub read_confirmed: bool,
    pub reading_time_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
