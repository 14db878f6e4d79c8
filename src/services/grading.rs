// src/services/grading.rs
//
// Pure rules of the submission lifecycle. Everything here works on rows that the
// caller has already loaded (and locked), so it can be tested without a database.

use std::collections::HashMap;

use crate::{
    error::AppError,
    models::{
        quiz::QuestionType,
        submission::{
            Answer, AnswerPayload, GradeOutcome, QuestionResult, Submission, SubmissionStatus,
            SubmitAnswerRequest,
        },
    },
};

/// Longest free-text answer accepted, in characters.
pub const MAX_TEXT_ANSWER_CHARS: usize = 10_000;

/// The slice of a question that grading needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct QuestionKey {
    pub id: i64,
    pub position: i32,
    #[sqlx(try_from = "String")]
    pub kind: QuestionKind,
}

/// `QuestionType` read straight from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionKind(pub QuestionType);

impl TryFrom<String> for QuestionKind {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse()
            .map(QuestionKind)
            .map_err(AppError::InternalServerError)
    }
}

/// The answer key of one choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ChoiceKey {
    pub id: i64,
    pub question_id: i64,
    pub is_correct: bool,
}

/// Outcome of grading a whole submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeReport {
    pub results: Vec<QuestionResult>,
    pub correct_count: i32,
    pub gradable_count: i32,
    pub score: f64,
}

/// Only the student who started the attempt may drive it.
pub fn ensure_owner(submission: &Submission, caller_id: i64) -> Result<(), AppError> {
    if submission.student_id != caller_id {
        return Err(AppError::Forbidden(
            "You cannot modify another student's submission".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_in_progress(submission: &Submission) -> Result<(), AppError> {
    match submission.state()? {
        SubmissionStatus::InProgress => Ok(()),
        SubmissionStatus::Finished => Err(AppError::InvalidState(
            "Submission is already finished and cannot be modified".to_string(),
        )),
    }
}

/// Guard shared by answer capture and finalize. Ownership is checked first so that
/// strangers learn nothing about the attempt's state.
pub fn ensure_modifiable(submission: &Submission, caller_id: i64) -> Result<(), AppError> {
    ensure_owner(submission, caller_id)?;
    ensure_in_progress(submission)
}

/// Checks an answer body against the question it targets.
///
/// `choices` are the choices of that question. A single-choice question takes a
/// choice id from that list and nothing else; a free-text question takes text only.
pub fn resolve_payload(
    question_type: QuestionType,
    request: &SubmitAnswerRequest,
    choices: &[ChoiceKey],
) -> Result<AnswerPayload, AppError> {
    let payload = match (request.selected_choice_id, request.text_answer.as_ref()) {
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidAnswerFormat(
                "Provide either 'selected_choice_id' or 'text_answer', not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(AppError::InvalidAnswerFormat(
                "Either 'selected_choice_id' or 'text_answer' must be provided".to_string(),
            ));
        }
        (Some(choice_id), None) => AnswerPayload::Choice(choice_id),
        (None, Some(text)) => AnswerPayload::Text(text.clone()),
    };

    match (question_type, &payload) {
        (QuestionType::SingleChoice, AnswerPayload::Choice(choice_id)) => {
            let belongs = choices
                .iter()
                .any(|c| c.id == *choice_id && c.question_id == request.question_id);
            if !belongs {
                return Err(AppError::InvalidAnswerFormat(
                    "Selected choice does not belong to this question".to_string(),
                ));
            }
        }
        (QuestionType::FreeText, AnswerPayload::Text(text)) => {
            if text.chars().count() > MAX_TEXT_ANSWER_CHARS {
                return Err(AppError::InvalidAnswerFormat(format!(
                    "Text answers are limited to {} characters",
                    MAX_TEXT_ANSWER_CHARS
                )));
            }
        }
        (QuestionType::SingleChoice, AnswerPayload::Text(_)) => {
            return Err(AppError::InvalidAnswerFormat(
                "Single-choice questions expect 'selected_choice_id'".to_string(),
            ));
        }
        (QuestionType::FreeText, AnswerPayload::Choice(_)) => {
            return Err(AppError::InvalidAnswerFormat(
                "Free-text questions expect 'text_answer'".to_string(),
            ));
        }
    }

    Ok(payload)
}

fn ordered(questions: &[QuestionKey]) -> Vec<QuestionKey> {
    let mut ordered = questions.to_vec();
    ordered.sort_by_key(|q| (q.position, q.id));
    ordered
}

fn summarize(results: Vec<QuestionResult>) -> GradeReport {
    let gradable_count = results
        .iter()
        .filter(|r| r.question_type == QuestionType::SingleChoice)
        .count() as i32;
    let correct_count = results
        .iter()
        .filter(|r| r.outcome == GradeOutcome::Correct)
        .count() as i32;
    let score = if gradable_count == 0 {
        0.0
    } else {
        f64::from(correct_count) / f64::from(gradable_count)
    };

    GradeReport {
        results,
        correct_count,
        gradable_count,
        score,
    }
}

/// Grades every question of the quiz, in presentation order.
///
/// Single-choice answers are correct when the selected choice is flagged correct.
/// Free-text answers stay ungraded. Missing answers score zero.
pub fn grade(questions: &[QuestionKey], answers: &[Answer], keys: &[ChoiceKey]) -> GradeReport {
    let by_question: HashMap<i64, &Answer> = answers.iter().map(|a| (a.question_id, a)).collect();
    let key_map: HashMap<i64, &ChoiceKey> = keys.iter().map(|k| (k.id, k)).collect();

    let results = ordered(questions)
        .into_iter()
        .map(|question| {
            let answer = by_question.get(&question.id);
            let (outcome, correct) = match (question.kind.0, answer) {
                (QuestionType::SingleChoice, None) => (GradeOutcome::Unanswered, Some(false)),
                (QuestionType::FreeText, None) => (GradeOutcome::Unanswered, None),
                (QuestionType::FreeText, Some(_)) => (GradeOutcome::Ungraded, None),
                (QuestionType::SingleChoice, Some(answer)) => {
                    let is_correct = answer
                        .selected_choice_id
                        .and_then(|id| key_map.get(&id))
                        .is_some_and(|key| key.question_id == question.id && key.is_correct);
                    if is_correct {
                        (GradeOutcome::Correct, Some(true))
                    } else {
                        (GradeOutcome::Incorrect, Some(false))
                    }
                }
            };

            QuestionResult {
                question_id: question.id,
                question_type: question.kind.0,
                answer_id: answer.map(|a| a.id),
                outcome,
                correct,
                points: if outcome == GradeOutcome::Correct { 1.0 } else { 0.0 },
            }
        })
        .collect();

    summarize(results)
}

/// Rebuilds the per-question results of a finished submission from the grades
/// persisted at finalize, without consulting the current answer key.
pub fn stored_results(questions: &[QuestionKey], answers: &[Answer]) -> GradeReport {
    let by_question: HashMap<i64, &Answer> = answers.iter().map(|a| (a.question_id, a)).collect();

    let results = ordered(questions)
        .into_iter()
        .map(|question| {
            let answer = by_question.get(&question.id);
            let (outcome, correct) = match (question.kind.0, answer) {
                (QuestionType::SingleChoice, None) => (GradeOutcome::Unanswered, Some(false)),
                (QuestionType::FreeText, None) => (GradeOutcome::Unanswered, None),
                (QuestionType::FreeText, Some(_)) => (GradeOutcome::Ungraded, None),
                (QuestionType::SingleChoice, Some(answer)) if answer.is_correct == Some(true) => {
                    (GradeOutcome::Correct, Some(true))
                }
                (QuestionType::SingleChoice, Some(_)) => (GradeOutcome::Incorrect, Some(false)),
            };

            QuestionResult {
                question_id: question.id,
                question_type: question.kind.0,
                answer_id: answer.map(|a| a.id),
                outcome,
                correct,
                points: answer.and_then(|a| a.points).unwrap_or(0.0),
            }
        })
        .collect();

    summarize(results)
}
