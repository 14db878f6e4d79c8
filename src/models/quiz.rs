// src/models/quiz.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    /// Stored for clients; attempts are not cut off server-side.
    pub time_limit_minutes: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    FreeText,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::FreeText => "free_text",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "free_text" => Ok(QuestionType::FreeText),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    /// 'single_choice' or 'free_text'.
    pub question_type: String,
    /// Presentation and grading order; ties are broken by id.
    /// The column is `position` since ORDER is reserved in SQL.
    #[serde(rename = "order")]
    pub position: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Question {
    pub fn kind(&self) -> Result<QuestionType, crate::error::AppError> {
        self.question_type
            .parse()
            .map_err(crate::error::AppError::InternalServerError)
    }
}

/// Represents the 'choices' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Choice as shown to students (excludes `is_correct`).
#[derive(Debug, Serialize)]
pub struct PublicChoice {
    pub id: i64,
    pub text: String,
}

/// A choice as rendered inside a quiz detail: authors see the key, students do not.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChoiceView {
    Full(Choice),
    Public(PublicChoice),
}

#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<ChoiceView>,
}

/// Quiz with its ordered questions and their choices.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionDetail>,
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub time_limit_minutes: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub time_limit_minutes: Option<i32>,
}

/// DTO for creating a question. Single-choice questions may carry their choices inline.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    pub question_type: QuestionType,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
    #[validate(nested)]
    #[serde(default)]
    pub choices: Vec<CreateChoiceRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: Option<String>,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChoiceRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChoiceRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: Option<String>,
    pub is_correct: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuizListParams {
    pub course_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Checks the inline choices of a new question against its type.
/// Single-choice questions need at most one correct choice; free-text questions take none.
pub fn validate_inline_choices(
    question_type: QuestionType,
    choices: &[CreateChoiceRequest],
) -> Result<(), crate::error::AppError> {
    use crate::error::AppError;

    match question_type {
        QuestionType::FreeText if !choices.is_empty() => Err(AppError::BadRequest(
            "Free-text questions cannot have choices".to_string(),
        )),
        QuestionType::SingleChoice if choices.iter().filter(|c| c.is_correct).count() > 1 => {
            Err(AppError::BadRequest(
                "A single-choice question has exactly one correct choice".to_string(),
            ))
        }
        _ => Ok(()),
    }
}
