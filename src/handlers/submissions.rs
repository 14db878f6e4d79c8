// src/handlers/submissions.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::submission::{SubmissionListParams, SubmitAnswerRequest},
    services::SubmissionService,
    utils::jwt::Claims,
};

/// Starts an attempt on a quiz, or resumes the one in progress.
/// 201 Created for a new attempt, 200 OK when resuming.
pub async fn start_submission(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = SubmissionService::start(&pool, claims.user_id()?, quiz_id).await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(outcome.submission)))
}

/// Records the caller's answer to one question of an attempt in progress.
pub async fn submit_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(submission_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let answer =
        SubmissionService::submit_answer(&pool, claims.user_id()?, submission_id, payload).await?;
    Ok(Json(answer))
}

/// Closes the attempt and returns its graded result.
pub async fn finalize_submission(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(submission_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = SubmissionService::finalize(&pool, claims.user_id()?, submission_id).await?;
    Ok(Json(result))
}

pub async fn list_submissions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SubmissionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let submissions = SubmissionService::list(&pool, &claims, params).await?;
    Ok(Json(submissions))
}

pub async fn get_submission(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = SubmissionService::get_detail(&pool, &claims, id).await?;
    Ok(Json(detail))
}
