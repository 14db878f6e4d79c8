// src/services/mod.rs

pub mod catalog;
pub mod grading;
pub mod submission;

pub use submission::SubmissionService;
