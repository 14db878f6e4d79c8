// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{LoginRequest, RegisterRequest, Role, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, JwtKeys},
    },
};

/// Registers a new student or instructor.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterRequest>,
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
        AppError::Conflict(_) => AppError::Conflict("Username or email already exists".to_string()),
        other => {
            tracing::error!("Failed to register user: {:?}", other);
            other
        }
    })?;

    tracing::info!(user_id = user.id, role = %payload.role, "user registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Verifies the username and password against the database.
/// If valid, signs a JWT token with the user's ID and role.
pub async fn login(
    State(pool): State<PgPool>,
    State(keys): State<Arc<JwtKeys>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password, role, is_active, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await?;

    // Same message for unknown user and wrong password.
    let invalid = || AppError::AuthError("Invalid username or password".to_string());

    let user = user.ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(invalid());
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    let role: Role = user
        .role
        .parse()
        .map_err(AppError::InternalServerError)?;
    let token = keys.sign(user.id, role)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "expires_in": keys.expiration_seconds(),
        "role": role,
    })))
}

/// Returns the account behind the current token.
pub async fn me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password, role, is_active, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
