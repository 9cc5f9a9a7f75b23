//! Authentication adapters.
//!
//! Implementations of the `SessionValidator` port:
//!
//! - `oidc` - Production JWT validation against an OIDC issuer's JWKS
//! - `mock` - Fixed-token validator for tests

mod mock;
mod oidc;

pub use mock::MockSessionValidator;
pub use oidc::{OidcConfig, OidcSessionValidator};
