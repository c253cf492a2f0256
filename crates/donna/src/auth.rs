//! Optional shared-token authentication.
//!
//! When auth is enabled, HTTP routes require `Authorization: Bearer
//! <token>` and websocket routes accept a `token` query parameter. With
//! auth disabled every request passes. Enabled auth without a configured
//! token denies everything.

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::AuthSettings;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct AuthState {
    settings: AuthSettings,
}

impl AuthState {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Whether the given presented token grants access.
    pub fn allows(&self, presented: Option<&str>) -> bool {
        self.settings.allows(presented)
    }
}

/// Bearer-token middleware for the HTTP API.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if auth.allows(presented) {
        return Ok(next.run(request).await);
    }
    match presented {
        None => Err(AuthError::MissingToken),
        Some(_) => Err(AuthError::InvalidToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(enabled: bool, token: Option<&str>) -> AuthState {
        AuthState {
            settings: AuthSettings {
                enabled,
                token: token.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_disabled_allows_everything() {
        let auth = state(false, Some("secret"));
        assert!(auth.allows(None));
        assert!(auth.allows(Some("wrong")));
    }

    #[test]
    fn test_enabled_without_token_fails_closed() {
        let auth = state(true, None);
        assert!(!auth.allows(None));
        assert!(!auth.allows(Some("anything")));
    }

    #[test]
    fn test_enabled_with_token_matches_exactly() {
        let auth = state(true, Some("secret"));
        assert!(auth.allows(Some("secret")));
        assert!(!auth.allows(Some("wrong")));
        assert!(!auth.allows(None));
    }
}
