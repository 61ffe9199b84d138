//! Exercise grading request DTOs

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::constants::MAX_SOURCE_CODE_LENGTH;

/// Body of both run and submit
#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    /// Source code, verbatim
    #[validate(length(min = 1, max = MAX_SOURCE_CODE_LENGTH))]
    pub code: String,

    /// Programming language
    #[validate(length(min = 1, max = 20))]
    pub language: String,
}

/// Attempt history query parameters
#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Staff only: whose attempts to list
    pub student_id: Option<Uuid>,
}
