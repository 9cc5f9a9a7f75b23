//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `SUBSCRIPTION_SYNC`
//! prefix and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use subscription_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod database;
mod error;
mod payment;
mod server;

pub use auth::AuthConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, timeouts)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment configuration (Stripe)
    pub payment: PaymentConfig,

    /// Authentication configuration (OIDC issuer, internal token)
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load and validate configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `SUBSCRIPTION_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Validates every section
    ///
    /// - `SUBSCRIPTION_SYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SUBSCRIPTION_SYNC__PAYMENT__STRIPE_API_KEY=...` -> `payment.stripe_api_key = ...`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config: AppConfig = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SUBSCRIPTION_SYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.auth.validate(&self.server.environment)?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
