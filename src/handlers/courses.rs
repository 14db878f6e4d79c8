// src/handlers/courses.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
    models::{
        course::{
            Course, CourseListParams, CourseStatus, CreateCourseRequest, UpdateCourseRequest,
            order_clause,
        },
        user::Role,
    },
    services::catalog::{self, authorize_author, require_staff},
    utils::{
        html::{clean_html, clean_optional},
        jwt::Claims,
    },
};

/// Lists live courses with optional filters, search and ordering.
pub async fn list_courses(
    State(pool): State<PgPool>,
    Query(params): Query<CourseListParams>,
) -> Result<impl IntoResponse, AppError> {
    let search_pattern = params.q.as_ref().map(|k| format!("%{}%", k));
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    // ORDER BY comes from a fixed whitelist, never from raw input.
    let sql = format!(
        r#"
        SELECT * FROM courses
        WHERE is_deleted = FALSE
          AND ($1::TEXT IS NULL OR status = $1)
          AND ($2::BIGINT IS NULL OR instructor_id = $2)
          AND ($3::TEXT IS NULL OR title ILIKE $3 OR description ILIKE $3)
        ORDER BY {}
        LIMIT $4 OFFSET $5
        "#,
        order_clause(params.ordering.as_deref())
    );

    let courses = sqlx::query_as::<_, Course>(&sql)
        .bind(params.status.map(|s| s.as_str()))
        .bind(params.instructor_id)
        .bind(search_pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&pool)
        .await?;

    Ok(Json(courses))
}

/// Retrieves a single live course by ID.
pub async fn get_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let course = catalog::get_course(&mut conn, id).await?;
    Ok(Json(course))
}

/// Creates a course. Instructors own what they create; admins may assign an instructor.
pub async fn create_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let role = require_staff(&claims)?;
    let instructor_id = match role {
        Role::Admin => payload.instructor_id,
        _ => Some(claims.user_id()?),
    };

    if let Some(instructor_id) = instructor_id {
        ensure_instructor(&pool, instructor_id).await?;
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (title, description, price_cents, instructor_id, status, image_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(clean_html(&payload.title))
    .bind(clean_html(&payload.description))
    .bind(payload.price_cents)
    .bind(instructor_id)
    .bind(payload.status.unwrap_or(CourseStatus::Draft).as_str())
    .bind(payload.image_url)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create course: {:?}", e);
        AppError::from(e)
    })?;

    tracing::info!(course_id = course.id, ?instructor_id, "course created");

    Ok((StatusCode::CREATED, Json(course)))
}

/// Updates a course. Owner instructor or admin only; only admins may reassign it.
pub async fn update_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;
    let course = catalog::get_course(&mut conn, id).await?;
    authorize_author(&claims, course.instructor_id)?;

    if let Some(instructor_id) = payload.instructor_id {
        if !claims.is_admin() {
            return Err(AppError::Forbidden(
                "Only admins can reassign a course".to_string(),
            ));
        }
        ensure_instructor(&pool, instructor_id).await?;
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            price_cents = COALESCE($4, price_cents),
            status = COALESCE($5, status),
            image_url = COALESCE($6, image_url),
            instructor_id = COALESCE($7, instructor_id),
            updated_at = NOW()
        WHERE id = $1 AND is_deleted = FALSE
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(clean_optional(payload.title))
    .bind(clean_optional(payload.description))
    .bind(payload.price_cents)
    .bind(payload.status.map(|s| s.as_str()))
    .bind(payload.image_url)
    .bind(payload.instructor_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    Ok(Json(course))
}

/// Soft-deletes a course. Owner instructor or admin only.
pub async fn delete_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let course = catalog::get_course(&mut conn, id).await?;
    authorize_author(&claims, course.instructor_id)?;

    sqlx::query(
        r#"
        UPDATE courses
        SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND is_deleted = FALSE
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(course_id = id, "course soft-deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Restores a soft-deleted course. Owner instructor or admin only.
pub async fn restore_course(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE id = $1 AND is_deleted = TRUE",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Deleted course not found".to_string()))?;

    authorize_author(&claims, course.instructor_id)?;

    let course = sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses
        SET is_deleted = FALSE, deleted_at = NULL, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    tracing::info!(course_id = id, "course restored");

    Ok(Json(course))
}

/// Lists soft-deleted courses: all of them for admins, their own for instructors.
pub async fn list_deleted_courses(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let role = require_staff(&claims)?;
    let owner = match role {
        Role::Admin => None,
        _ => Some(claims.user_id()?),
    };

    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT * FROM courses
        WHERE is_deleted = TRUE
          AND ($1::BIGINT IS NULL OR instructor_id = $1)
        ORDER BY deleted_at DESC, id DESC
        "#,
    )
    .bind(owner)
    .fetch_all(&pool)
    .await?;

    Ok(Json(courses))
}

async fn ensure_instructor(pool: &PgPool, user_id: i64) -> Result<(), AppError> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match role.as_deref() {
        Some("instructor") => Ok(()),
        Some(_) => Err(AppError::BadRequest(
            "Assigned user is not an instructor".to_string(),
        )),
        None => Err(AppError::NotFound("Instructor not found".to_string())),
    }
}
