use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::progress::OverrideStatus;
use crate::models::submission::SubmissionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    #[validate(length(min = 1))]
    pub text: String,
    pub expected_answer: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuizPayload {
    pub class_id: Uuid,
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<CreateQuestionPayload>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizPayload {
    // Using serde deserializer to trim and convert empty strings to None
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,

    /// Replaces the whole question set when present.
    pub questions: Option<Vec<CreateQuestionPayload>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GradeAnswerPayload {
    pub question_id: Uuid,
    #[validate(range(min = 0, max = 100, message = "Score must be between 0 and 100"))]
    pub score: i32,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GradeSubmissionRequest {
    #[validate(length(min = 1, message = "At least one graded answer is required"))]
    pub grades: Vec<GradeAnswerPayload>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeSubmissionResponse {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub score: i32,
    pub teacher_percentage: i32,
    pub auto_correct_percentage: i32,
    pub passed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverrideStatusRequest {
    pub status: OverrideStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssignLevelRequest {
    #[validate(range(min = 1, max = 3, message = "Assistance level must be 1, 2 or 3"))]
    pub level: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveLevel2Request {
    pub approved: bool,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRecapQuestionPayload {
    #[validate(length(min = 1))]
    pub text: String,
    #[validate(length(min = 2, message = "At least two options are required"))]
    pub options: Vec<String>,
    pub correct_option: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLevel1Payload {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1, message = "At least one question is required"))]
    pub questions: Vec<CreateRecapQuestionPayload>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLevel2Payload {
    #[validate(length(min = 1))]
    pub prompt: String,
    pub material_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLevel3Payload {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub material_url: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateClassPayload {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollStudentPayload {
    pub student_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

// Custom deserializer to trim strings and convert empty strings to None
fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}
