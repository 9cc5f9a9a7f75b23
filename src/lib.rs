//! Subscription Sync - keeps per-account subscription state in step with Stripe.
//!
//! Verified Stripe webhook events are projected onto account records with
//! compare-and-set writes, so duplicated, reordered or concurrent deliveries
//! converge on the newest state. The crate also provisions Stripe customers
//! for new accounts and exposes authenticated subscription and billing-portal
//! actions.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
