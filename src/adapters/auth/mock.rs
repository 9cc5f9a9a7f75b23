//! Mock session validator for testing.
//!
//! # Example
//!
//! ```ignore
//! let validator = MockSessionValidator::new().with_test_user("valid-token", "user-123");
//!
//! let user = validator.validate("valid-token").await?;
//! assert_eq!(user.id.as_str(), "user-123");
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, AuthError, AuthenticatedUser};
use crate::ports::SessionValidator;

/// Maps fixed tokens to users. Tokens not in the map return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockSessionValidator {
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    /// Returned for every validation when set.
    force_error: RwLock<Option<AuthError>>,
}

impl MockSessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
        self
    }

    /// Adds a token for `account_id` with a derived test email.
    ///
    /// An invalid `account_id` is ignored, leaving the token unknown.
    pub fn with_test_user(self, token: impl Into<String>, account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        match AccountId::new(account_id.clone()) {
            Ok(id) => {
                let email = format!("{}@test.example.com", account_id);
                let user = AuthenticatedUser::new(id, Some(email));
                self.with_user(token, user)
            }
            Err(_) => self,
        }
    }

    /// Forces all validations to return `error`.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }
}

#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_returns_user() {
        let validator = MockSessionValidator::new().with_test_user("tok", "user-1");

        let user = validator.validate("tok").await.unwrap();

        assert_eq!(user.id.as_str(), "user-1");
        assert_eq!(user.email.as_deref(), Some("user-1@test.example.com"));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let validator = MockSessionValidator::new().with_test_user("tok", "user-1");

        assert_eq!(validator.validate("other").await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn forced_error_wins_over_known_token() {
        let validator = MockSessionValidator::new()
            .with_test_user("tok", "user-1")
            .with_error(AuthError::ServiceUnavailable("idp down".into()));

        let result = validator.validate("tok").await;

        assert!(matches!(result, Err(AuthError::ServiceUnavailable(_))));
    }
}
