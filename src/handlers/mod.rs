// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod courses;
pub mod enrollments;
pub mod health;
pub mod quizzes;
pub mod submissions;
