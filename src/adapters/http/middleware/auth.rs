//! Authentication middleware and extractors for axum.
//!
//! - `auth_middleware` - validates Bearer tokens and injects the user into extensions
//! - `RequireAuth` - extractor that requires an authenticated user
//! - `internal_token_middleware` - guards service-to-service routes with a shared token
//!
//! ```text
//! Request → auth_middleware → injects AuthenticatedUser into extensions
//!                                      ↓
//!                              Handler → RequireAuth extractor reads from extensions
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::domain::foundation::{AuthError, AuthenticatedUser};
use crate::ports::SessionValidator;

use crate::adapters::http::billing::ErrorResponse;

/// Auth middleware state - wraps the session validator.
pub type AuthState = Arc<dyn SessionValidator>;

/// Shared secret expected on internal routes.
#[derive(Clone)]
pub struct InternalToken(Arc<SecretString>);

impl InternalToken {
    pub fn new(token: SecretString) -> Self {
        Self(Arc::new(token))
    }

    /// Constant-time comparison against a presented token.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.expose_secret().as_bytes();
        expected.ct_eq(presented.as_bytes()).into()
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn unauthenticated(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("UNAUTHENTICATED", message)),
    )
        .into_response()
}

/// Validates the Bearer token, if any, through the `SessionValidator` port.
///
/// A missing token passes through without a user; `RequireAuth` rejects it
/// later. An invalid token is rejected here with 401, and an unreachable
/// identity provider with 503.
pub async fn auth_middleware(
    State(validator): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return next.run(request).await;
    };

    match validator.validate(token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(AuthError::TokenExpired) => unauthenticated("Token expired"),
        Err(AuthError::InvalidToken) => unauthenticated("Invalid token"),
        Err(AuthError::ServiceUnavailable(msg)) => {
            tracing::error!(error = %msg, "Auth service unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(
                    "SERVICE_UNAVAILABLE",
                    "Authentication service unavailable",
                )),
            )
                .into_response()
        }
    }
}

/// Rejects requests whose Bearer token is not the internal shared token.
pub async fn internal_token_middleware(
    State(expected): State<InternalToken>,
    request: Request,
    next: Next,
) -> Response {
    let verdict = bearer_token(&request).map(|presented| expected.matches(presented));

    match verdict {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "Rejected internal call with wrong token");
            unauthenticated("Invalid internal token")
        }
        None => unauthenticated("Authentication required"),
    }
}

/// Extractor that requires authentication.
///
/// Reads the user `auth_middleware` placed in the request extensions and
/// rejects with 401 when there is none.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> axum::extract::FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .cloned()
                .map(RequireAuth)
                .ok_or(AuthRejection::Unauthenticated)
        })
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No valid authentication token was provided.
    Unauthenticated,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Unauthenticated => unauthenticated("Authentication required"),
        }
    }
}
