// src/services/catalog.rs
//
// Read-only lookups into the course catalog and the enrollment ledger. They take a
// connection so the submission engine can run them inside its own transaction.

use sqlx::PgConnection;

use crate::{
    error::AppError,
    models::{course::Course, quiz::Quiz, user::Role},
    utils::jwt::Claims,
};

/// Resolves a quiz whose course has not been soft-deleted.
pub async fn get_quiz(conn: &mut PgConnection, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        SELECT q.id, q.course_id, q.title, q.description, q.time_limit_minutes,
               q.created_at, q.updated_at
        FROM quizzes q
        JOIN courses c ON c.id = q.course_id
        WHERE q.id = $1 AND c.is_deleted = FALSE
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(quiz)
}

/// True when the student holds a live enrollment with status 'active'.
pub async fn is_actively_enrolled(
    conn: &mut PgConnection,
    student_id: i64,
    course_id: i64,
) -> Result<bool, AppError> {
    let enrolled: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM enrollments
            WHERE student_id = $1
              AND course_id = $2
              AND status = 'active'
              AND is_deleted = FALSE
        )
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(enrolled)
}

/// Loads a live (not soft-deleted) course.
pub async fn get_course(conn: &mut PgConnection, course_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 AND is_deleted = FALSE")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
}

/// Instructor owning the course a quiz belongs to, if any.
pub async fn instructor_of_quiz(
    conn: &mut PgConnection,
    quiz_id: i64,
) -> Result<Option<i64>, AppError> {
    let instructor: Option<Option<i64>> = sqlx::query_scalar(
        r#"
        SELECT c.instructor_id
        FROM quizzes q
        JOIN courses c ON c.id = q.course_id
        WHERE q.id = $1
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(instructor.flatten())
}

/// Admins may author anything; instructors only the courses they own.
pub fn authorize_author(claims: &Claims, owner_id: Option<i64>) -> Result<(), AppError> {
    match claims.role()? {
        Role::Admin => Ok(()),
        Role::Instructor if owner_id == Some(claims.user_id()?) => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only the course instructor or an admin can do this".to_string(),
        )),
    }
}

/// Staff gate for endpoints that create authored content.
pub fn require_staff(claims: &Claims) -> Result<Role, AppError> {
    let role = claims.role()?;
    if !role.is_staff() {
        return Err(AppError::Forbidden(
            "Instructor or admin role required".to_string(),
        ));
    }
    Ok(role)
}
