// src/models/user.rs

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static username pattern"));

/// Platform role carried by every account and every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Student => "student",
        }
    }

    /// Admins and instructors may author courses and quizzes.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Instructor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "instructor" => Ok(Role::Instructor),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// 'admin', 'instructor' or 'student'.
    pub role: String,

    /// Disabled accounts cannot log in.
    pub is_active: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for self-registration. Admin accounts cannot be created this way.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(
            min = 3,
            max = 50,
            message = "Username length must be between 3 and 50 characters."
        ),
        custom(function = validate_username)
    )]
    pub username: String,
    #[validate(email(message = "Email address is invalid."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Password fields didn't match."))]
    pub password_confirm: String,
    #[validate(custom(function = validate_self_service_role))]
    pub role: Role,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for Admin creating a user (can specify any role).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(
        length(
            min = 3,
            max = 50,
            message = "Username length must be between 3 and 50 characters."
        ),
        custom(function = validate_username)
    )]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: Role,
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(length(min = 3, max = 50), custom(function = validate_username))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<Role>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_username(username: &str) -> Result<(), validator::ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(validator::ValidationError::new("invalid_username_characters"));
    }
    Ok(())
}

fn validate_self_service_role(role: &Role) -> Result<(), validator::ValidationError> {
    if *role == Role::Admin {
        return Err(validator::ValidationError::new("cannot_register_as_admin"));
    }
    Ok(())
}
