use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "submission_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionStatus {
    Pending,
    Passed,
    Failed,
}

/// Auto-grade verdict for a single answer. Stored as a nullable boolean;
/// `Indeterminate` means the question carried no expected answer, which is
/// not the same thing as `Incorrect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Correct,
    Incorrect,
    Indeterminate,
}

impl Verdict {
    pub fn from_db(raw: Option<bool>) -> Self {
        match raw {
            Some(true) => Verdict::Correct,
            Some(false) => Verdict::Incorrect,
            None => Verdict::Indeterminate,
        }
    }

    pub fn to_db(self) -> Option<bool> {
        match self {
            Verdict::Correct => Some(true),
            Verdict::Incorrect => Some(false),
            Verdict::Indeterminate => None,
        }
    }

    pub fn is_correct(self) -> bool {
        self == Verdict::Correct
    }
}

/// One main-quiz attempt. Created once per attempt; the answers are frozen
/// after auto-grading except for the teacher-assigned score/feedback fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizSubmission {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub status: SubmissionStatus,
    pub score: Option<i32>,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubmissionAnswer {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: String,
    /// Auto-grade verdict, written once at submission time. Teacher grading
    /// never touches this column.
    pub is_correct: Option<bool>,
    /// Teacher-assigned score (0-100), independent of the verdict.
    pub score: Option<i32>,
    pub feedback: Option<String>,
}

impl SubmissionAnswer {
    pub fn verdict(&self) -> Verdict {
        Verdict::from_db(self.is_correct)
    }
}
