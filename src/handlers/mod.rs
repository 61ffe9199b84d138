//! HTTP Request Handlers
//!
//! This module contains all HTTP request handlers organized by domain.

pub mod exercises;
pub mod health;
pub mod submissions;

use axum::{Router, middleware};
use serde::Serialize;

use crate::{
    middleware::{auth_middleware, rate_limit_middleware},
    state::AppState,
};

/// Success envelope shared by every JSON endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Create all API routes
pub fn routes(state: AppState) -> Router<AppState> {
    // Layers run bottom-up: authenticate first, then count against the user's budget
    let protected = Router::new()
        .nest("/exercises", exercises::routes())
        .nest("/submissions", submissions::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(health::routes()).merge(protected)
}
