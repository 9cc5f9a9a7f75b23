//! Application layer - command handlers.
//!
//! Orchestrates the billing domain over the `AccountDirectory` and
//! `PaymentProvider` ports. Transport concerns live in `adapters::http`.

pub mod handlers;

pub use handlers::*;
