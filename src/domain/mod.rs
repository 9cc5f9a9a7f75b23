//! Domain layer - Pure business logic with no infrastructure dependencies.
//!
//! - `foundation` - Identifiers, timestamps, caller identity
//! - `billing` - Subscription state, event verification and projection

pub mod billing;
pub mod foundation;
