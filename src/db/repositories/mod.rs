//! Database repositories
//!
//! Repositories handle all direct database interactions. The grading service
//! only sees the store traits below, so it can be driven by in-memory fakes.

pub mod enrollment_repo;
pub mod exercise_repo;
pub mod submission_repo;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CodeSubmission, Exercise, NewCodeSubmission},
};

pub use enrollment_repo::EnrollmentRepository;
pub use exercise_repo::ExerciseRepository;
pub use submission_repo::SubmissionRepository;

/// Read-only source of exercise definitions
#[async_trait]
pub trait ExerciseStore: Send + Sync {
    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<Exercise>>;
}

/// Enrollment predicate for students
#[async_trait]
pub trait EnrollmentChecker: Send + Sync {
    async fn is_enrolled(&self, student_id: &Uuid, course_id: &Uuid) -> AppResult<bool>;
}

/// Why a submission could not be written
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Another submit took the same attempt number first
    #[error("attempt number already taken")]
    AttemptConflict,

    #[error("{0}")]
    Other(String),
}

/// Append-only store of graded attempts
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Highest attempt number for the pair plus one (1 when none exist)
    async fn next_attempt(&self, exercise_id: &Uuid, student_id: &Uuid) -> AppResult<i32>;

    /// Write one record atomically
    async fn insert(&self, submission: &NewCodeSubmission) -> Result<CodeSubmission, PersistError>;

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<CodeSubmission>>;

    /// Attempts of one student on one exercise, newest first, with the total count
    async fn list_for_student(
        &self,
        exercise_id: &Uuid,
        student_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<CodeSubmission>, i64)>;
}
