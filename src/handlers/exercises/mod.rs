//! Exercise grading handlers

mod handler;
pub mod request;
pub mod response;

pub use handler::*;
pub use request::*;
pub use response::*;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Exercise routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{id}/run", post(handler::run_code))
        .route("/{id}/submit", post(handler::submit_code))
        .route("/{id}/submissions", get(handler::list_submissions))
}
