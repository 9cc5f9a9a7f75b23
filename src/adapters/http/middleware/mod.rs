//! HTTP middleware for axum.
//!
//! - `auth` - Bearer-token authentication, user extractor, internal token guard

pub mod auth;

pub use auth::{
    auth_middleware, internal_token_middleware, AuthRejection, AuthState, InternalToken,
    RequireAuth,
};
