//! Exercise grading handler implementations

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    error::{AppError, AppResult},
    handlers::ApiResponse,
    middleware::AuthenticatedUser,
    services::{GradeRequest, GradeResponse},
    state::AppState,
};

use super::{
    request::{CodeRequest, ListAttemptsQuery},
    response::AttemptsListResponse,
};

fn grade_request(exercise_id: Uuid, user: AuthenticatedUser, payload: CodeRequest) -> GradeRequest {
    GradeRequest {
        exercise_id,
        code: payload.code,
        language: payload.language,
        user_id: user.id,
        user_role: user.role,
    }
}

/// Run code against the visible test cases
pub async fn run_code(
    State(state): State<AppState>,
    Path(exercise_id): Path<Uuid>,
    auth_user: AuthenticatedUser,
    Json(payload): Json<CodeRequest>,
) -> AppResult<Json<ApiResponse<GradeResponse>>> {
    payload.validate()?;

    let response = state
        .grading()
        .run_code(grade_request(exercise_id, auth_user, payload))
        .await?;

    Ok(Json(ApiResponse::ok(response)))
}

/// Submit code for grading against every test case
pub async fn submit_code(
    State(state): State<AppState>,
    Path(exercise_id): Path<Uuid>,
    auth_user: AuthenticatedUser,
    Json(payload): Json<CodeRequest>,
) -> AppResult<Json<ApiResponse<GradeResponse>>> {
    payload.validate()?;

    let response = state
        .grading()
        .submit_code(grade_request(exercise_id, auth_user, payload))
        .await?;

    Ok(Json(ApiResponse::ok(response)))
}

/// List recorded attempts on an exercise, newest first
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(exercise_id): Path<Uuid>,
    auth_user: AuthenticatedUser,
    Query(query): Query<ListAttemptsQuery>,
) -> AppResult<Json<ApiResponse<AttemptsListResponse>>> {
    let student_id = match query.student_id {
        Some(id) if id != auth_user.id => {
            if !auth_user.is_staff() {
                return Err(AppError::Forbidden(
                    "Only instructors can view other students' attempts".to_string(),
                ));
            }
            id
        }
        _ => auth_user.id,
    };

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(page - 1) * i64::from(per_page);

    let (submissions, total) = state
        .grading()
        .list_submissions(&exercise_id, &student_id, offset, i64::from(per_page))
        .await?;

    Ok(Json(ApiResponse::ok(AttemptsListResponse {
        submissions,
        total,
        page,
        per_page,
    })))
}
