// src/models/submission.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Lifecycle of one attempt. A missing row is the implicit initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    /// Terminal: the submission and its answers are frozen and graded.
    Finished,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Finished => "finished",
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SubmissionStatus::InProgress),
            "finished" => Ok(SubmissionStatus::Finished),
            other => Err(format!("unknown submission status '{}'", other)),
        }
    }
}

/// Represents the 'submissions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    /// 'in_progress' or 'finished'.
    pub status: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Fraction of single-choice questions answered correctly, set at finalize.
    pub score: Option<f64>,
    pub correct_count: Option<i32>,
    pub gradable_count: Option<i32>,
}

impl Submission {
    pub fn state(&self) -> Result<SubmissionStatus, AppError> {
        self.status.parse().map_err(AppError::InternalServerError)
    }
}

/// Represents the 'answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub submission_id: i64,
    pub question_id: i64,
    pub selected_choice_id: Option<i64>,
    pub text_answer: Option<String>,
    /// Null until finalize; stays null for free-text answers awaiting review.
    pub is_correct: Option<bool>,
    pub points: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Raw body of an answer-submit call. Exactly one field must be present.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub selected_choice_id: Option<i64>,
    pub text_answer: Option<String>,
}

/// Answer body after it has been checked against the question's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerPayload {
    Choice(i64),
    Text(String),
}

impl AnswerPayload {
    pub fn choice_id(&self) -> Option<i64> {
        match self {
            AnswerPayload::Choice(id) => Some(*id),
            AnswerPayload::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            AnswerPayload::Choice(_) => None,
            AnswerPayload::Text(text) => Some(text),
        }
    }
}

/// Grade of one question in a finished submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeOutcome {
    Correct,
    Incorrect,
    /// Free-text answer left for manual review.
    Ungraded,
    Unanswered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub question_type: crate::models::quiz::QuestionType,
    pub answer_id: Option<i64>,
    pub outcome: GradeOutcome,
    /// `None` for ungraded free-text answers.
    pub correct: Option<bool>,
    pub points: f64,
}

/// Finalized submission with per-question results.
/// The aggregate score and counts travel on the flattened submission row.
#[derive(Debug, Serialize)]
pub struct SubmissionResult {
    #[serde(flatten)]
    pub submission: Submission,
    pub results: Vec<QuestionResult>,
}

/// Submission with its captured answers; finished submissions also carry results.
#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub submission: Submission,
    pub answers: Vec<Answer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<QuestionResult>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionListParams {
    pub quiz_id: Option<i64>,
    pub status: Option<SubmissionStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
