//! Authentication types for the domain layer.
//!
//! The caller identity is issued by an external identity provider and reaches
//! us as a bearer JWT. Adapters behind the `SessionValidator` port turn it into
//! an `AuthenticatedUser`; nothing here knows about JWTs.

use super::AccountId;
use thiserror::Error;

/// Caller identity extracted from a validated access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Account the token was issued for (the `sub` claim).
    pub id: AccountId,

    /// Email claim, when the provider includes one.
    pub email: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(id: AccountId, email: Option<String>) -> Self {
        Self { id, email }
    }

    /// True when this identity owns the given account.
    pub fn owns(&self, account_id: &AccountId) -> bool {
        &self.id == account_id
    }
}

/// Authentication errors that can occur during token validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    /// The identity provider could not be reached.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
