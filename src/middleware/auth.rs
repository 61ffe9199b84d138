//! Authentication middleware
//!
//! Tokens are issued elsewhere on the platform; this service only verifies
//! them and turns the claims into the caller identity used for grading.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::UserRole,
    state::AppState,
};

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Verify an HS256 token and return its claims
pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Authenticated user extracted from JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub username: String,
    /// Raw role claim; parsed where it matters
    pub role: String,
}

impl AuthenticatedUser {
    /// Parsed role, `None` for roles this service does not know
    pub fn user_role(&self) -> Option<UserRole> {
        UserRole::from_str(&self.role)
    }

    /// Whether the caller is an instructor or admin
    pub fn is_staff(&self) -> bool {
        self.user_role().is_some_and(|r| r.is_staff())
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let uri = request.uri().clone();

    let Some(auth_header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    else {
        debug!(path = %uri.path(), "Auth failed: No Authorization header");
        return Err(AppError::Unauthorized);
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        debug!(path = %uri.path(), "Auth failed: Invalid Authorization format (expected 'Bearer <token>')");
        return Err(AppError::Unauthorized);
    };

    let user = authenticate(token, &state.config().jwt.secret).inspect_err(|e| {
        debug!(path = %uri.path(), error = ?e, "Auth failed: Token verification failed");
    })?;

    debug!(path = %uri.path(), user_id = %user.id, role = %user.role, "User authenticated successfully");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Turn a bearer token into the caller identity
fn authenticate(token: &str, secret: &str) -> AppResult<AuthenticatedUser> {
    let claims = verify_token(token, secret)?;
    let id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

    Ok(AuthenticatedUser {
        id,
        username: claims.username,
        role: claims.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, role: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            username: "ada".to_string(),
            role: role.to_string(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let id = Uuid::new_v4();
        let user = authenticate(&token(&id.to_string(), "instructor", 3600), SECRET).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "ada");
        assert_eq!(user.user_role(), Some(UserRole::Instructor));
        assert!(user.is_staff());
    }

    #[test]
    fn test_expired_token() {
        let err = authenticate(&token(&Uuid::new_v4().to_string(), "student", -3600), SECRET)
            .unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret_and_bad_subject() {
        let tok = token(&Uuid::new_v4().to_string(), "student", 3600);
        assert!(matches!(
            authenticate(&tok, "other-secret").unwrap_err(),
            AppError::InvalidToken
        ));

        let tok = token("not-a-uuid", "student", 3600);
        assert!(matches!(
            authenticate(&tok, SECRET).unwrap_err(),
            AppError::InvalidToken
        ));
    }

    #[test]
    fn test_unknown_role_is_not_staff() {
        let user = AuthenticatedUser {
            id: Uuid::new_v4(),
            username: "x".to_string(),
            role: "superuser".to_string(),
        };
        assert_eq!(user.user_role(), None);
        assert!(!user.is_staff());
    }
}
