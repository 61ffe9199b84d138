//! Enrollment repository

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::EnrollmentChecker;
use crate::error::AppResult;

/// Repository for course enrollments
#[derive(Clone)]
pub struct EnrollmentRepository {
    pool: PgPool,
}

impl EnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentChecker for EnrollmentRepository {
    async fn is_enrolled(&self, student_id: &Uuid, course_id: &Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM enrollments
                WHERE student_id = $1 AND course_id = $2 AND is_active
            )
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
