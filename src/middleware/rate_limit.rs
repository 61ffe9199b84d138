//! Rate limiting middleware
//!
//! Fixed-window counters in Redis, one per user and endpoint bucket. Every
//! run or submit spawns interpreters, so those endpoints get their own
//! tighter budgets. A Redis outage lets requests through.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use redis::AsyncCommands;

use crate::{constants::rate_limits, error::AppError, middleware::AuthenticatedUser, state::AppState};

/// Rate limit middleware; must run after authentication
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user_id) = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.id)
    else {
        return Ok(next.run(request).await);
    };

    let (bucket, limit, window) = get_rate_limit(request.uri().path());
    let key = format!("rate_limit:{}:{}", user_id, bucket);
    let mut redis = state.redis();

    let count: i64 = redis.incr(&key, 1).await.unwrap_or(0);

    if count == 1 {
        // Set expiry on first request
        let _: () = redis.expire(&key, window).await.unwrap_or(());
    }

    if count > limit {
        tracing::debug!(user_id = %user_id, bucket, count, "Rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}

/// Bucket name, max requests and window in seconds for a path
fn get_rate_limit(path: &str) -> (&'static str, i64, i64) {
    if path.ends_with("/run") {
        ("run", rate_limits::RUN_MAX_REQUESTS, rate_limits::RUN_WINDOW_SECS)
    } else if path.ends_with("/submit") {
        (
            "submit",
            rate_limits::SUBMIT_MAX_REQUESTS,
            rate_limits::SUBMIT_WINDOW_SECS,
        )
    } else {
        (
            "general",
            rate_limits::GENERAL_MAX_REQUESTS,
            rate_limits::GENERAL_WINDOW_SECS,
        )
    }
}
