//! Adapters - Implementations of port interfaces.
//!
//! - `auth` - OIDC/JWKS session validation (plus a mock)
//! - `http` - axum routes, middleware and error mapping
//! - `memory` - In-memory account directory
//! - `postgres` - PostgreSQL account directory and migrations
//! - `stripe` - Stripe REST client (plus a mock)

pub mod auth;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
