// src/handlers/enrollments.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::AppError,
    models::{
        enrollment::{
            CreateEnrollmentRequest, Enrollment, EnrollmentListParams, UpdateEnrollmentRequest,
        },
        user::Role,
    },
    services::catalog,
    utils::jwt::Claims,
};

/// Lists enrollments. Students see their own, instructors those on their courses, admins all.
pub async fn list_enrollments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<EnrollmentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let caller_id = claims.user_id()?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let scope = match claims.role()? {
        Role::Admin => "$1::BIGINT IS NOT NULL",
        Role::Instructor => "c.instructor_id = $1",
        Role::Student => "e.student_id = $1",
    };

    let enrollments = sqlx::query_as::<_, Enrollment>(&format!(
        r#"
        SELECT e.*
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.is_deleted = FALSE
          AND {scope}
          AND ($2::BIGINT IS NULL OR e.course_id = $2)
          AND ($3::BIGINT IS NULL OR e.student_id = $3)
          AND ($4::TEXT IS NULL OR e.status = $4)
        ORDER BY e.enrolled_at DESC, e.id DESC
        LIMIT $5 OFFSET $6
        "#
    ))
    .bind(caller_id)
    .bind(params.course_id)
    .bind(params.student_id)
    .bind(params.status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    Ok(Json(enrollments))
}

pub async fn get_enrollment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = fetch_live(&pool, id).await?;
    authorize_reader(&pool, &claims, &enrollment).await?;
    Ok(Json(enrollment))
}

/// Enrolls a student into a live course.
/// Students always enroll themselves; admins must name the student.
pub async fn create_enrollment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateEnrollmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = match claims.role()? {
        Role::Student => claims.user_id()?,
        Role::Admin => payload.student_id.ok_or_else(|| {
            AppError::BadRequest("student_id is required when enrolling as admin".to_string())
        })?,
        Role::Instructor => {
            return Err(AppError::Forbidden(
                "Instructors cannot create enrollments".to_string(),
            ));
        }
    };

    let mut conn = pool.acquire().await?;
    catalog::get_course(&mut conn, payload.course_id).await?;

    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;
    match role.as_deref() {
        Some("student") => {}
        Some(_) => {
            return Err(AppError::BadRequest(
                "Only students can be enrolled".to_string(),
            ));
        }
        None => return Err(AppError::NotFound("Student not found".to_string())),
    }

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (student_id, course_id)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(payload.course_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => {
            AppError::Conflict("Student is already enrolled in this course".to_string())
        }
        other => other,
    })?;

    tracing::info!(
        enrollment_id = enrollment.id,
        student_id,
        course_id = payload.course_id,
        "student enrolled"
    );

    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Changes the status of an enrollment. The enrolled student or an admin.
pub async fn update_enrollment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateEnrollmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = fetch_live(&pool, id).await?;
    authorize_owner(&claims, &enrollment)?;

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        UPDATE enrollments
        SET status = $2, updated_at = NOW()
        WHERE id = $1 AND is_deleted = FALSE
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.status.as_str())
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))?;

    tracing::info!(enrollment_id = id, status = payload.status.as_str(), "enrollment updated");

    Ok(Json(enrollment))
}

/// Soft-deletes an enrollment. The enrolled student or an admin.
pub async fn delete_enrollment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = fetch_live(&pool, id).await?;
    authorize_owner(&claims, &enrollment)?;

    sqlx::query(
        r#"
        UPDATE enrollments
        SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND is_deleted = FALSE
        "#,
    )
    .bind(id)
    .execute(&pool)
    .await?;

    tracing::info!(enrollment_id = id, "enrollment soft-deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Restores a soft-deleted enrollment.
/// Admin only. Fails with a conflict if the student has re-enrolled since.
pub async fn restore_enrollment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        UPDATE enrollments
        SET is_deleted = FALSE, deleted_at = NULL, updated_at = NOW()
        WHERE id = $1 AND is_deleted = TRUE
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => {
            AppError::Conflict("Student already has a live enrollment in this course".to_string())
        }
        other => other,
    })?
    .ok_or_else(|| AppError::NotFound("Deleted enrollment not found".to_string()))?;

    tracing::info!(enrollment_id = id, "enrollment restored");

    Ok(Json(enrollment))
}

async fn fetch_live(pool: &PgPool, id: i64) -> Result<Enrollment, AppError> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE id = $1 AND is_deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))
}

fn authorize_owner(claims: &Claims, enrollment: &Enrollment) -> Result<(), AppError> {
    if claims.is_admin() || enrollment.student_id == claims.user_id()? {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "You can only manage your own enrollments".to_string(),
    ))
}

/// Owner and admin pass directly; instructors may read enrollments on their own courses.
async fn authorize_reader(
    pool: &PgPool,
    claims: &Claims,
    enrollment: &Enrollment,
) -> Result<(), AppError> {
    if authorize_owner(claims, enrollment).is_ok() {
        return Ok(());
    }

    let instructor: Option<Option<i64>> =
        sqlx::query_scalar("SELECT instructor_id FROM courses WHERE id = $1")
            .bind(enrollment.course_id)
            .fetch_optional(pool)
            .await?;

    catalog::authorize_author(claims, instructor.flatten())
}
