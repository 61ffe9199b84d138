//! Code submission repository

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{PersistError, SubmissionStore};
use crate::{
    error::{AppError, AppResult},
    models::{CodeSubmission, CodeSubmissionRow, NewCodeSubmission},
};

const SELECT_COLUMNS: &str = r#"
    id, exercise_id, student_id, language, code, code_sha256, test_results,
    score, passed, attempt_number, execution_time_ms, submitted_at
"#;

/// Repository for persisted attempts
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: PgPool,
}

impl SubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_submission(row: CodeSubmissionRow) -> AppResult<CodeSubmission> {
    let id = row.id;
    CodeSubmission::try_from(row)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt submission {}: {}", id, e)))
}

impl From<sqlx::Error> for PersistError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => PersistError::AttemptConflict,
            _ => PersistError::Other(err.to_string()),
        }
    }
}

#[async_trait]
impl SubmissionStore for SubmissionRepository {
    async fn next_attempt(&self, exercise_id: &Uuid, student_id: &Uuid) -> AppResult<i32> {
        let next: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(attempt_number), 0) + 1
            FROM code_submissions
            WHERE exercise_id = $1 AND student_id = $2
            "#,
        )
        .bind(exercise_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(next)
    }

    async fn insert(&self, submission: &NewCodeSubmission) -> Result<CodeSubmission, PersistError> {
        let row = sqlx::query_as::<_, CodeSubmissionRow>(&format!(
            r#"
            INSERT INTO code_submissions (
                exercise_id, student_id, language, code, code_sha256, test_results,
                score, passed, attempt_number, execution_time_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(submission.exercise_id)
        .bind(submission.student_id)
        .bind(submission.language.as_str())
        .bind(&submission.code)
        .bind(&submission.code_sha256)
        .bind(sqlx::types::Json(&submission.test_results))
        .bind(submission.score)
        .bind(submission.passed)
        .bind(submission.attempt_number)
        .bind(submission.execution_time)
        .fetch_one(&self.pool)
        .await?;

        CodeSubmission::try_from(row).map_err(PersistError::Other)
    }

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<CodeSubmission>> {
        let row = sqlx::query_as::<_, CodeSubmissionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM code_submissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_submission).transpose()
    }

    async fn list_for_student(
        &self,
        exercise_id: &Uuid,
        student_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<CodeSubmission>, i64)> {
        let rows = sqlx::query_as::<_, CodeSubmissionRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM code_submissions
            WHERE exercise_id = $1 AND student_id = $2
            ORDER BY attempt_number DESC
            OFFSET $3 LIMIT $4
            "#
        ))
        .bind(exercise_id)
        .bind(student_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM code_submissions WHERE exercise_id = $1 AND student_id = $2",
        )
        .bind(exercise_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;

        let submissions = rows
            .into_iter()
            .map(into_submission)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((submissions, count))
    }
}
