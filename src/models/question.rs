use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A main-quiz question. `expected_answer` is optional: without one the
/// auto-grader cannot decide correctness and the answer verdict stays
/// indeterminate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub text: String,
    pub expected_answer: Option<String>,
    pub image_url: Option<String>,
    pub ordinal: i32,
}

impl Question {
    /// Expected answer normalized for grading; `None` when absent or empty
    /// after trimming.
    pub fn grading_key(&self) -> Option<&str> {
        self.expected_answer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
