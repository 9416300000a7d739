use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::progress::NextStep;
use crate::models::submission::SubmissionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub answer_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(length(min = 1, message = "At least one answer is required"))]
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitQuizResponse {
    pub submission_id: Uuid,
    pub attempt_number: i32,
    pub status: SubmissionStatus,
    pub score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub passed: bool,
    pub next_action: Option<NextStep>,
    /// Submitted question ids that matched no question in the quiz. The
    /// rest of the submission still persists; these are reported, not
    /// silently dropped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmatched_question_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizStatusResponse {
    pub quiz_id: Uuid,
    pub current_attempt: i32,
    pub failed_attempts: i32,
    pub last_attempt_passed: Option<bool>,
    pub final_status: Option<SubmissionStatus>,
    pub level1_completed: bool,
    pub level2_completed: bool,
    pub level3_completed: bool,
    pub level1_accessible: bool,
    pub level2_accessible: bool,
    pub level3_accessible: bool,
    pub must_retake_main_quiz: bool,
    pub can_take_main_quiz: bool,
    pub next_action: Option<NextStep>,
    pub last_submission_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecapAnswerInput {
    pub question_id: Uuid,
    pub selected_option: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitLevel1Request {
    #[validate(length(min = 1, message = "At least one answer is required"))]
    pub answers: Vec<RecapAnswerInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitLevel1Response {
    pub submission_id: Uuid,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub passed: bool,
    pub next_action: Option<NextStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitLevel2Request {
    #[validate(length(min = 1, message = "Essay text is required"))]
    pub essay_text: String,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitLevel2Response {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompleteLevel3Request {
    #[validate(range(min = 0))]
    pub reading_time_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteLevel3Response {
    pub completed: bool,
    pub next_action: Option<NextStep>,
}
