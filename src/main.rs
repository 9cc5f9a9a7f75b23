//! Subscription Sync server binary.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_sync::adapters::auth::{OidcConfig, OidcSessionValidator};
use subscription_sync::adapters::http::{app_router, BillingAppState, InternalToken};
use subscription_sync::adapters::postgres::{PostgresAccountDirectory, MIGRATOR};
use subscription_sync::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use subscription_sync::application::handlers::billing::{
    HandleWebhookHandler, ReconciliationApplier,
};
use subscription_sync::config::AppConfig;
use subscription_sync::domain::billing::WebhookVerifier;
use subscription_sync::ports::{AccountDirectory, PaymentProvider, SessionValidator};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;

    init_tracing(&config);

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .max_lifetime(config.database.max_lifetime())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        MIGRATOR.run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let directory: Arc<dyn AccountDirectory> = Arc::new(PostgresAccountDirectory::new(
        pool,
        config.database.query_timeout(),
    ));

    let payment_provider: Arc<dyn PaymentProvider> = Arc::new(StripePaymentAdapter::new(
        StripeConfig::from_secret(config.payment.stripe_api_key.clone())
            .with_base_url(config.payment.api_base_url.clone())
            .with_timeout(config.payment.request_timeout()),
    )?);

    let session_validator: Arc<dyn SessionValidator> = Arc::new(OidcSessionValidator::new(
        OidcConfig::new(config.auth.issuer_url.clone(), config.auth.audience.clone())
            .with_cache_duration(config.auth.jwks_cache_ttl()),
    )?);

    let webhook_handler = HandleWebhookHandler::new(
        WebhookVerifier::new(
            config.payment.stripe_webhook_secret.clone(),
            config.payment.webhook_tolerance(),
        ),
        ReconciliationApplier::new(directory.clone()),
        config.server.webhook_timeout(),
    );

    let state = BillingAppState {
        directory,
        payment_provider,
        webhook_handler,
        portal_return_hosts: config.payment.portal_return_hosts_list(),
    };

    let app = app_router(
        state,
        session_validator,
        InternalToken::new(config.auth.internal_api_token.clone()),
        config.server.request_timeout(),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        stripe_test_mode = config.payment.is_test_mode(),
        "Subscription sync listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// JSON logs in production, human-readable elsewhere.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
