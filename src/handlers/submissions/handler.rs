//! Submission handler implementations

use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    handlers::ApiResponse,
    middleware::AuthenticatedUser,
    models::CodeSubmission,
    state::AppState,
};

/// Get one recorded attempt
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthenticatedUser,
) -> AppResult<Json<ApiResponse<CodeSubmission>>> {
    let role = auth_user
        .user_role()
        .ok_or_else(|| AppError::Validation(format!("Invalid role '{}'", auth_user.role)))?;

    let submission = state
        .grading()
        .get_submission(&id, &auth_user.id, role)
        .await?;

    Ok(Json(ApiResponse::ok(submission)))
}
