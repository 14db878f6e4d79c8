// src/models/enrollment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'enrollments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    /// 'active', 'completed' or 'cancelled'.
    pub status: String,
    pub enrolled_at: chrono::DateTime<chrono::Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }
}

/// DTO for enrolling. Students omit `student_id`; admins may enroll anyone.
#[derive(Debug, Deserialize)]
pub struct CreateEnrollmentRequest {
    pub course_id: i64,
    pub student_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEnrollmentRequest {
    pub status: EnrollmentStatus,
}

/// Query parameters for listing enrollments.
#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentListParams {
    pub course_id: Option<i64>,
    pub student_id: Option<i64>,
    pub status: Option<EnrollmentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
