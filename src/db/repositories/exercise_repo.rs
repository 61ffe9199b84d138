//! Exercise repository

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::ExerciseStore;
use crate::{
    error::{AppError, AppResult},
    models::{Exercise, ExerciseRow},
};

/// Repository for exercise definitions
#[derive(Clone)]
pub struct ExerciseRepository {
    pool: PgPool,
}

impl ExerciseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExerciseStore for ExerciseRepository {
    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<Exercise>> {
        let row = sqlx::query_as::<_, ExerciseRow>(
            r#"
            SELECT id, course_id, title, languages, test_cases, starter_code,
                   time_limit_seconds, function_name, input_format
            FROM exercises
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Exercise::try_from(row)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt exercise {}: {}", id, e)))
        })
        .transpose()
    }
}
