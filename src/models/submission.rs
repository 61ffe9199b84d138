//! Submission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Language;

/// Outcome of one test case in one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    /// Serialized return value (empty when the code produced none)
    pub output: String,
    pub expected_output: String,
    /// Empty when execution succeeded
    pub error: String,
    /// Milliseconds
    pub execution_time: u64,
    pub points_earned: i32,
}

impl TestResult {
    /// A test case that never produced a comparable value
    pub fn failed(expected_output: &str, error: String, execution_time: u64) -> Self {
        Self {
            passed: false,
            output: String::new(),
            expected_output: expected_output.to_string(),
            error,
            execution_time,
            points_earned: 0,
        }
    }
}

/// Persisted, immutable record of one graded attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSubmission {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub student_id: Uuid,
    pub language: Language,
    pub code: String,
    pub code_sha256: String,
    /// Index-aligned with the exercise's test cases at submit time
    pub test_results: Vec<TestResult>,
    pub score: i32,
    pub passed: bool,
    pub attempt_number: i32,
    /// Sum of per-test-case execution times in milliseconds
    pub execution_time: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Everything needed to write a CodeSubmission; id and timestamp are assigned on insert
#[derive(Debug, Clone)]
pub struct NewCodeSubmission {
    pub exercise_id: Uuid,
    pub student_id: Uuid,
    pub language: Language,
    pub code: String,
    pub code_sha256: String,
    pub test_results: Vec<TestResult>,
    pub score: i32,
    pub passed: bool,
    pub attempt_number: i32,
    pub execution_time: i64,
}

/// Submission row in the database
#[derive(Debug, Clone, FromRow)]
pub struct CodeSubmissionRow {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub student_id: Uuid,
    pub language: String,
    pub code: String,
    pub code_sha256: String,
    pub test_results: sqlx::types::Json<Vec<TestResult>>,
    pub score: i32,
    pub passed: bool,
    pub attempt_number: i32,
    pub execution_time_ms: i64,
    pub submitted_at: DateTime<Utc>,
}

impl TryFrom<CodeSubmissionRow> for CodeSubmission {
    type Error = String;

    fn try_from(row: CodeSubmissionRow) -> Result<Self, Self::Error> {
        let language = Language::from_str(&row.language)
            .ok_or_else(|| format!("unknown language '{}'", row.language))?;

        Ok(Self {
            id: row.id,
            exercise_id: row.exercise_id,
            student_id: row.student_id,
            language,
            code: row.code,
            code_sha256: row.code_sha256,
            test_results: row.test_results.0,
            score: row.score,
            passed: row.passed,
            attempt_number: row.attempt_number,
            execution_time: row.execution_time_ms,
            submitted_at: row.submitted_at,
        })
    }
}
