//! ExerciseJudge - Programming Exercise Grading Engine
//!
//! This library grades student code submissions for an e-learning platform:
//! it runs submitted functions against an exercise's test cases in a sandbox,
//! compares return values, scores the result and records graded attempts.
//!
//! # Features
//!
//! - Python and JavaScript submissions behind one language strategy table
//! - Process-per-test-case isolation (rlimits) or throw-away Docker containers
//! - Practice runs on visible test cases, graded submits on all of them
//! - Monotonic, race-safe attempt numbering
//!
//! # Architecture
//!
//! The application follows a layered architecture:
//! - **Handlers**: HTTP request handlers (thin layer)
//! - **Services**: Grading orchestration
//! - **Grading**: Input parsing, sandboxed execution, comparison, scoring
//! - **Repositories**: Database access behind store traits
//! - **Models**: Domain models and DTOs

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod grading;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
