//! OIDC adapter for bearer JWT validation.
//!
//! Implements the `SessionValidator` port against any OIDC issuer that
//! publishes its signing keys at `{issuer}/.well-known/jwks.json`:
//!
//! 1. Fetch and cache the issuer's JWKS
//! 2. Verify the JWT signature with the key named by the header's `kid`
//! 3. Validate issuer, audience and expiry
//! 4. Map `sub` to the caller's `AccountId`
//!
//! Keys are fetched lazily on first use. An unknown `kid` forces a refetch so
//! signing-key rotation is picked up before the cache TTL runs out. Forced
//! refetches are limited to one per `FORCED_REFRESH_INTERVAL`, so forged
//! `kid`s cannot turn inbound requests into calls to the issuer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::domain::foundation::{AccountId, AuthError, AuthenticatedUser};
use crate::ports::SessionValidator;

const DEFAULT_JWKS_CACHE: Duration = Duration::from_secs(3600);
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the OIDC adapter.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer URL, used for JWKS discovery and the `iss` check.
    pub issuer_url: String,

    /// Tokens must list this audience.
    pub audience: String,

    pub jwks_cache_duration: Duration,
}

impl OidcConfig {
    pub fn new(issuer_url: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            audience: audience.into(),
            jwks_cache_duration: DEFAULT_JWKS_CACHE,
        }
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.jwks_cache_duration = duration;
        self
    }

    fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,

    #[serde(default)]
    email: Option<String>,
}

struct JwksCache {
    jwks: JwkSet,
    fetched_at: Instant,
    cache_duration: Duration,
    last_forced_refresh: Option<Instant>,
}

impl JwksCache {
    fn new(jwks: JwkSet, cache_duration: Duration) -> Self {
        Self {
            jwks,
            fetched_at: Instant::now(),
            cache_duration,
            last_forced_refresh: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() > self.cache_duration
    }

    fn forced_recently(&self, interval: Duration) -> bool {
        self.last_forced_refresh.is_some_and(|at| at.elapsed() < interval)
    }
}

/// Production `SessionValidator`.
pub struct OidcSessionValidator {
    config: OidcConfig,
    http_client: reqwest::Client,
    jwks_cache: Arc<RwLock<Option<JwksCache>>>,
    forced_refresh_interval: Duration,
}

impl OidcSessionValidator {
    /// Does not contact the issuer; keys are fetched on first validation.
    pub fn new(config: OidcConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::ServiceUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            jwks_cache: Arc::new(RwLock::new(None)),
            forced_refresh_interval: FORCED_REFRESH_INTERVAL,
        })
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let url = self.config.jwks_url();
        tracing::debug!(%url, "Fetching JWKS");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch JWKS");
            AuthError::ServiceUnavailable(format!("Failed to fetch JWKS: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, "JWKS endpoint returned an error");
            return Err(AuthError::ServiceUnavailable(format!(
                "JWKS endpoint returned {}",
                status
            )));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse JWKS");
            AuthError::ServiceUnavailable(format!("Failed to parse JWKS: {}", e))
        })?;

        tracing::debug!(keys = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }

    /// Returns the cached key set unless expired.
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(cached) = (*cache).as_ref().filter(|c| !c.is_expired()) {
                return Ok(cached.jwks.clone());
            }
        }

        let jwks = self.fetch_jwks().await?;
        let mut cache = self.jwks_cache.write().await;
        let last_forced_refresh = cache.as_ref().and_then(|c| c.last_forced_refresh);
        *cache = Some(JwksCache {
            last_forced_refresh,
            ..JwksCache::new(jwks.clone(), self.config.jwks_cache_duration)
        });
        Ok(jwks)
    }

    /// Refetches the key set for an unknown `kid`.
    ///
    /// Returns `None` if a forced refetch happened within the last
    /// `forced_refresh_interval`. The slot is claimed before fetching.
    async fn force_refresh_jwks(&self) -> Result<Option<JwkSet>, AuthError> {
        {
            let mut cache = self.jwks_cache.write().await;
            if let Some(cached) = cache.as_mut() {
                if cached.forced_recently(self.forced_refresh_interval) {
                    return Ok(None);
                }
                cached.last_forced_refresh = Some(Instant::now());
            }
        }

        let jwks = self.fetch_jwks().await?;
        let mut cache = self.jwks_cache.write().await;
        *cache = Some(JwksCache {
            last_forced_refresh: Some(Instant::now()),
            ..JwksCache::new(jwks.clone(), self.config.jwks_cache_duration)
        });
        Ok(Some(jwks))
    }

    fn decoding_key(jwk: &jsonwebtoken::jwk::Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
        let algorithm = match jwk.common.key_algorithm {
            Some(KeyAlgorithm::RS256) | None => Algorithm::RS256,
            Some(KeyAlgorithm::RS384) => Algorithm::RS384,
            Some(KeyAlgorithm::RS512) => Algorithm::RS512,
            Some(KeyAlgorithm::ES256) => Algorithm::ES256,
            Some(KeyAlgorithm::ES384) => Algorithm::ES384,
            Some(KeyAlgorithm::EdDSA) => Algorithm::EdDSA,
            Some(other) => {
                tracing::warn!(algorithm = ?other, "Unsupported JWK algorithm");
                return Err(AuthError::InvalidToken);
            }
        };

        let key = DecodingKey::from_jwk(jwk).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build decoding key");
            AuthError::InvalidToken
        })?;

        Ok((key, algorithm))
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.config.issuer_url]);
        validation.set_audience(&[&self.config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
        validation
    }
}

#[async_trait]
impl SessionValidator for OidcSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "Failed to decode JWT header");
            AuthError::InvalidToken
        })?;

        let kid = header.kid.ok_or_else(|| {
            tracing::warn!("JWT missing 'kid' header");
            AuthError::InvalidToken
        })?;

        let mut jwks = self.get_jwks().await?;
        if jwks.find(&kid).is_none() {
            match self.force_refresh_jwks().await? {
                Some(refreshed) => {
                    tracing::info!(%kid, "Unknown signing key, refreshed JWKS");
                    jwks = refreshed;
                }
                None => tracing::debug!(%kid, "Unknown signing key, JWKS refresh throttled"),
            }
        }
        let jwk = jwks.find(&kid).ok_or_else(|| {
            tracing::warn!(%kid, "No matching key in JWKS");
            AuthError::InvalidToken
        })?;

        let (key, algorithm) = Self::decoding_key(jwk)?;
        if header.alg != algorithm {
            tracing::warn!(
                header_alg = ?header.alg,
                key_alg = ?algorithm,
                "JWT algorithm does not match key"
            );
            return Err(AuthError::InvalidToken);
        }

        let claims = decode::<Claims>(token, &key, &self.validation(algorithm))
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => {
                        tracing::warn!(error = %e, "Token validation failed");
                        AuthError::InvalidToken
                    }
                }
            })?
            .claims;

        let id = AccountId::new(claims.sub).map_err(|_| {
            tracing::warn!("Token subject is not a valid account id");
            AuthError::InvalidToken
        })?;

        Ok(AuthenticatedUser::new(id, claims.email))
    }
}

impl std::fmt::Debug for OidcSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcSessionValidator")
            .field("issuer_url", &self.config.issuer_url)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}
