// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;

use crate::error::AppError;

/// Liveness probe that also checks the database round-trip.
pub async fn health(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    sqlx::query("SELECT 1").execute(&pool).await.map_err(|e| {
        tracing::error!("Health check failed: {:?}", e);
        AppError::InternalServerError("Database unavailable".to_string())
    })?;

    Ok(Json(json!({ "status": "ok" })))
}
