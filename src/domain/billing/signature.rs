//! Stripe webhook signature verification.
//!
//! Stripe signs `"{t}.{raw_body}"` with HMAC-SHA256 using the endpoint's
//! signing secret and sends `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! Several `v1` entries appear while a secret is being rolled; any one match
//! authenticates the payload. The payload is only decoded after it verifies.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};

use super::{ProcessorEvent, VerificationError};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Maximum allowed clock skew for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<hex>[,v1=<hex>...]`. Unknown keys, including
    /// the legacy `v0`, are ignored.
    pub fn parse(header: &str) -> Result<Self, VerificationError> {
        if header.trim().is_empty() {
            return Err(VerificationError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| malformed("expected key=value pairs"))?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| malformed("timestamp is not an integer"))?,
                    );
                }
                "v1" => {
                    let signature = hex::decode(value.trim())
                        .map_err(|_| malformed("v1 signature is not hex"))?;
                    v1_signatures.push(signature);
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| malformed("missing timestamp"))?;
        if v1_signatures.is_empty() {
            return Err(malformed("missing v1 signature"));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn malformed(reason: &str) -> VerificationError {
    VerificationError::MalformedHeader(reason.to_string())
}

/// Authenticates inbound webhook payloads against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString, tolerance: Duration) -> Self {
        Self {
            secret,
            tolerance_secs: i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Verifies the payload against the current wall clock, then decodes it.
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProcessorEvent, VerificationError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit "now" in Unix seconds.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<ProcessorEvent, VerificationError> {
        let header = SignatureHeader::parse(signature_header)?;

        let age = now.saturating_sub(header.timestamp);
        if age > self.tolerance_secs {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "Webhook outside tolerance window, possible replay"
            );
            return Err(VerificationError::TimestampTooOld { age_secs: age });
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                ahead_secs = -age,
                "Webhook timestamp in the future"
            );
            return Err(VerificationError::TimestampInFuture { ahead_secs: -age });
        }

        let expected = self.compute_signature(header.timestamp, payload)?;

        let mut matched = Choice::from(0u8);
        for candidate in &header.v1_signatures {
            if candidate.len() == expected.len() {
                matched |= expected.as_slice().ct_eq(candidate.as_slice());
            }
        }
        if !bool::from(matched) {
            tracing::warn!(
                candidates = header.v1_signatures.len(),
                "Webhook signature mismatch"
            );
            return Err(VerificationError::SignatureMismatch);
        }

        ProcessorEvent::from_json(payload)
    }

    /// Builds a `Stripe-Signature` header value for `payload` the way Stripe
    /// would. Used to replay captured events against a local endpoint.
    pub fn signature_header_for(
        &self,
        timestamp: i64,
        payload: &[u8],
    ) -> Result<String, VerificationError> {
        let signature = self.compute_signature(timestamp, payload)?;
        Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
    }

    /// HMAC-SHA256 over `"{timestamp}.{raw bytes}"`. The payload is fed to the
    /// MAC as-is so non-UTF-8 bodies verify byte for byte.
    fn compute_signature(
        &self,
        timestamp: i64,
        payload: &[u8],
    ) -> Result<Vec<u8>, VerificationError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| VerificationError::SignatureMismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}
