// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
    models::user::{AdminCreateUserRequest, AdminUpdateUserRequest, Role, User},
    utils::{hash::hash_password, jwt::Claims},
};

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub role: Option<Role>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Lists users, optionally filtered by role.
/// Admin only.
pub async fn list_users(
    State(pool): State<PgPool>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password, role, is_active, created_at
        FROM users
        WHERE ($1::TEXT IS NULL OR role = $1)
        ORDER BY id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(params.role.map(|r| r.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(users))
}

/// Creates a new user with specific role.
/// Admin only.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, email, password, role, is_active, created_at
        "#,
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&hashed_password)
    .bind(payload.role.as_str())
    .fetch_one(&pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => {
            AppError::Conflict(format!("Username '{}' or email already exists", payload.username))
        }
        other => other,
    })?;

    tracing::info!(user_id = user.id, role = %payload.role, "admin created user");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Updates user information. Every present field is written in one transaction.
/// Admin only.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed = payload
        .password
        .as_deref()
        .map(hash_password)
        .transpose()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            username = COALESCE($2, username),
            email = COALESCE($3, email),
            role = COALESCE($4, role),
            password = COALESCE($5, password),
            is_active = COALESCE($6, is_active)
        WHERE id = $1
        RETURNING id, username, email, password, role, is_active, created_at
        "#,
    )
    .bind(id)
    .bind(payload.username.as_deref())
    .bind(payload.email.as_deref())
    .bind(payload.role.map(|r| r.as_str()))
    .bind(hashed.as_deref())
    .bind(payload.is_active)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self or another admin.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;

    match role.as_deref() {
        None => return Err(AppError::NotFound("User not found".to_string())),
        Some("admin") => {
            return Err(AppError::BadRequest(
                "Admin accounts cannot be deleted".to_string(),
            ));
        }
        Some(_) => {}
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::from(e)
        })?;

    tracing::info!(user_id = id, "user deleted");

    Ok(StatusCode::NO_CONTENT)
}
