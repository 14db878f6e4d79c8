// src/models/mod.rs

pub mod course;
pub mod enrollment;
pub mod quiz;
pub mod submission;
pub mod user;
