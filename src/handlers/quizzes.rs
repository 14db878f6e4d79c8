// src/handlers/quizzes.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
    models::quiz::{
        Choice, ChoiceView, CreateChoiceRequest, CreateQuestionRequest, CreateQuizRequest,
        PublicChoice, Question, QuestionDetail, QuestionType, Quiz, QuizDetail, QuizListParams,
        UpdateChoiceRequest, UpdateQuestionRequest, UpdateQuizRequest, validate_inline_choices,
    },
    services::catalog::{self, authorize_author},
    utils::{
        html::{clean_html, clean_optional},
        jwt::Claims,
    },
};

const QUIZ_COLUMNS: &str =
    "q.id, q.course_id, q.title, q.description, q.time_limit_minutes, q.created_at, q.updated_at";

// ---------------------------------------------------------------------------
// Quizzes
// ---------------------------------------------------------------------------

/// Lists quizzes of live courses, optionally for a single course.
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Query(params): Query<QuizListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let quizzes = sqlx::query_as::<_, Quiz>(&format!(
        r#"
        SELECT {QUIZ_COLUMNS}
        FROM quizzes q
        JOIN courses c ON c.id = q.course_id
        WHERE c.is_deleted = FALSE
          AND ($1::BIGINT IS NULL OR q.course_id = $1)
        ORDER BY q.id ASC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(params.course_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Quiz with ordered questions and choices.
/// Only the course instructor and admins see which choice is correct.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let quiz = catalog::get_quiz(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    let instructor = catalog::instructor_of_quiz(&mut conn, id).await?;
    let reveal_key = authorize_author(&claims, instructor).is_ok();

    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE quiz_id = $1 ORDER BY position ASC, id ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let choices = sqlx::query_as::<_, Choice>(
        r#"
        SELECT ch.*
        FROM choices ch
        JOIN questions qu ON qu.id = ch.question_id
        WHERE qu.quiz_id = $1
        ORDER BY ch.id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_question: HashMap<i64, Vec<ChoiceView>> = HashMap::new();
    for choice in choices {
        let question_id = choice.question_id;
        let view = if reveal_key {
            ChoiceView::Full(choice)
        } else {
            ChoiceView::Public(PublicChoice {
                id: choice.id,
                text: choice.text,
            })
        };
        by_question.entry(question_id).or_default().push(view);
    }

    let questions = questions
        .into_iter()
        .map(|question| QuestionDetail {
            choices: by_question.remove(&question.id).unwrap_or_default(),
            question,
        })
        .collect();

    Ok(Json(QuizDetail { quiz, questions }))
}

/// Creates a quiz in a live course. Course instructor or admin only.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;
    let course = catalog::get_course(&mut conn, payload.course_id).await?;
    authorize_author(&claims, course.instructor_id)?;

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes (course_id, title, description, time_limit_minutes)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.course_id)
    .bind(clean_html(&payload.title))
    .bind(clean_optional(payload.description).unwrap_or_default())
    .bind(payload.time_limit_minutes)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(quiz_id = quiz.id, course_id = quiz.course_id, "quiz created");

    Ok((StatusCode::CREATED, Json(quiz)))
}

pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;
    authorize_quiz_author(&mut conn, &claims, id).await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        UPDATE quizzes SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            time_limit_minutes = COALESCE($4, time_limit_minutes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(clean_optional(payload.title))
    .bind(clean_optional(payload.description))
    .bind(payload.time_limit_minutes)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    Ok(Json(quiz))
}

/// Deletes a quiz together with its questions and choices.
/// Refused once any attempt on it is finished.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    authorize_quiz_author(&mut tx, &claims, id).await?;
    ensure_structure_editable(&mut tx, id).await?;

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(quiz_id = id, "quiz deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// Adds a question to a quiz, with its choices if it is single-choice.
/// Without an explicit order the question is appended after the last one.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    validate_inline_choices(payload.question_type, &payload.choices)?;

    let mut tx = pool.begin().await?;
    authorize_quiz_author(&mut tx, &claims, quiz_id).await?;
    ensure_structure_editable(&mut tx, quiz_id).await?;

    let position = match payload.order {
        Some(order) => order,
        None => {
            sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE quiz_id = $1",
            )
            .bind(quiz_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions (quiz_id, text, question_type, position)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(quiz_id)
    .bind(clean_html(&payload.text))
    .bind(payload.question_type.as_str())
    .bind(position)
    .fetch_one(&mut *tx)
    .await?;

    let mut choices = Vec::with_capacity(payload.choices.len());
    for choice in &payload.choices {
        choices.push(ChoiceView::Full(insert_choice(&mut tx, question.id, choice).await?));
    }

    tx.commit().await?;

    tracing::info!(question_id = question.id, quiz_id, "question created");

    Ok((StatusCode::CREATED, Json(QuestionDetail { question, choices })))
}

/// Edits the text or the order of a question. The type is fixed once created.
pub async fn update_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;
    let question = fetch_question(&mut conn, id).await?;
    authorize_quiz_author(&mut conn, &claims, question.quiz_id).await?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        UPDATE questions SET
            text = COALESCE($2, text),
            position = COALESCE($3, position),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(clean_optional(payload.text))
    .bind(payload.order)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Json(question))
}

pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    let question = fetch_question(&mut tx, id).await?;
    authorize_quiz_author(&mut tx, &claims, question.quiz_id).await?;
    ensure_structure_editable(&mut tx, question.quiz_id).await?;

    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(question_id = id, "question deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

/// Adds a choice to a single-choice question.
pub async fn create_choice(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
    Json(payload): Json<CreateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let question = fetch_question(&mut tx, question_id).await?;
    authorize_quiz_author(&mut tx, &claims, question.quiz_id).await?;

    if question.kind()? != QuestionType::SingleChoice {
        return Err(AppError::BadRequest(
            "Choices can only be added to single-choice questions".to_string(),
        ));
    }

    let choice = insert_choice(&mut tx, question_id, &payload).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(choice)))
}

/// Edits a choice. Marking it correct clears the flag on its siblings.
pub async fn update_choice(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let choice = fetch_choice(&mut tx, id).await?;
    let question = fetch_question(&mut tx, choice.question_id).await?;
    authorize_quiz_author(&mut tx, &claims, question.quiz_id).await?;

    if payload.is_correct == Some(true) {
        clear_correct(&mut tx, choice.question_id, Some(id)).await?;
    }

    let choice = sqlx::query_as::<_, Choice>(
        r#"
        UPDATE choices SET
            text = COALESCE($2, text),
            is_correct = COALESCE($3, is_correct),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(clean_optional(payload.text))
    .bind(payload.is_correct)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(choice))
}

/// Removes a choice. In-progress answers that selected it are graded incorrect.
pub async fn delete_choice(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    let choice = fetch_choice(&mut tx, id).await?;
    let question = fetch_question(&mut tx, choice.question_id).await?;
    authorize_quiz_author(&mut tx, &claims, question.quiz_id).await?;
    ensure_structure_editable(&mut tx, question.quiz_id).await?;

    sqlx::query("DELETE FROM choices WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn authorize_quiz_author(
    conn: &mut PgConnection,
    claims: &Claims,
    quiz_id: i64,
) -> Result<(), AppError> {
    if catalog::get_quiz(conn, quiz_id).await?.is_none() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }
    let instructor = catalog::instructor_of_quiz(conn, quiz_id).await?;
    authorize_author(claims, instructor)
}

/// Locks the quiz row and refuses edits that would rewrite finished attempts.
/// Finalize takes a shared lock on the same row, so the two are serialized.
async fn ensure_structure_editable(conn: &mut PgConnection, quiz_id: i64) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
        .bind(quiz_id)
        .execute(&mut *conn)
        .await?;

    let finished: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM submissions WHERE quiz_id = $1 AND status = 'finished')",
    )
    .bind(quiz_id)
    .fetch_one(&mut *conn)
    .await?;

    if finished {
        tracing::warn!(quiz_id, "quiz edit rejected: finished submissions exist");
        return Err(AppError::Conflict(
            "Quiz has finished submissions; its questions and choices can no longer be added or removed"
                .to_string(),
        ));
    }
    Ok(())
}

async fn fetch_question(conn: &mut PgConnection, id: i64) -> Result<Question, AppError> {
    sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
}

async fn fetch_choice(conn: &mut PgConnection, id: i64) -> Result<Choice, AppError> {
    sqlx::query_as::<_, Choice>("SELECT * FROM choices WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Choice not found".to_string()))
}

async fn insert_choice(
    conn: &mut PgConnection,
    question_id: i64,
    choice: &CreateChoiceRequest,
) -> Result<Choice, AppError> {
    if choice.is_correct {
        clear_correct(conn, question_id, None).await?;
    }

    let choice = sqlx::query_as::<_, Choice>(
        r#"
        INSERT INTO choices (question_id, text, is_correct)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(question_id)
    .bind(clean_html(&choice.text))
    .bind(choice.is_correct)
    .fetch_one(&mut *conn)
    .await?;

    Ok(choice)
}

/// A single-choice question has at most one correct choice.
async fn clear_correct(
    conn: &mut PgConnection,
    question_id: i64,
    except: Option<i64>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE choices
        SET is_correct = FALSE, updated_at = NOW()
        WHERE question_id = $1
          AND is_correct = TRUE
          AND ($2::BIGINT IS NULL OR id <> $2)
        "#,
    )
    .bind(question_id)
    .bind(except)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
