// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use url::Url;
use validator::Validate;

/// Represents the 'courses' table in the database.
/// Rows with `is_deleted = TRUE` are hidden from regular listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Price in the smallest currency unit.
    pub price_cents: i64,
    /// Owner. Null once the instructor account is removed.
    pub instructor_id: Option<i64>,
    /// 'draft', 'active' or 'inactive'.
    pub status: String,
    pub image_url: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Active,
    Inactive,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "draft",
            CourseStatus::Active => "active",
            CourseStatus::Inactive => "inactive",
        }
    }
}

/// DTO for creating a new course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 20000))]
    pub description: String,
    #[validate(range(min = 0))]
    pub price_cents: i64,
    pub status: Option<CourseStatus>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub image_url: Option<String>,
    /// Admins may assign a course to an instructor; instructors always own what they create.
    pub instructor_id: Option<i64>,
}

/// DTO for updating a course. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 20000))]
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price_cents: Option<i64>,
    pub status: Option<CourseStatus>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub image_url: Option<String>,
    pub instructor_id: Option<i64>,
}

/// Query parameters for listing courses.
#[derive(Debug, Default, Deserialize)]
pub struct CourseListParams {
    pub status: Option<CourseStatus>,
    pub instructor_id: Option<i64>,
    /// Case-insensitive search over title and description.
    pub q: Option<String>,
    /// One of `title`, `price`, `created_at`, `status`; prefix with `-` for descending.
    pub ordering: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Maps a user-supplied `ordering` value onto a fixed ORDER BY clause.
/// Unknown keys fall back to newest first.
pub fn order_clause(ordering: Option<&str>) -> &'static str {
    match ordering.unwrap_or("-created_at") {
        "title" => "title ASC, id ASC",
        "-title" => "title DESC, id DESC",
        "price" => "price_cents ASC, id ASC",
        "-price" => "price_cents DESC, id DESC",
        "created_at" => "created_at ASC, id ASC",
        "status" => "status ASC, id ASC",
        "-status" => "status DESC, id DESC",
        _ => "created_at DESC, id DESC",
    }
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
