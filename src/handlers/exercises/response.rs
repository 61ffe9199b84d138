//! Exercise grading response DTOs

use serde::Serialize;

use crate::models::CodeSubmission;

/// Page of recorded attempts
#[derive(Debug, Serialize)]
pub struct AttemptsListResponse {
    pub submissions: Vec<CodeSubmission>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
