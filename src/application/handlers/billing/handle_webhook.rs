//! HandleWebhookHandler - verifies an inbound Stripe delivery and reconciles it.

use std::time::Duration;

use crate::domain::billing::{VerificationError, WebhookVerifier};
use crate::domain::foundation::EventId;

use super::reconcile_event::{ApplyOutcome, FailureReason, ReconciliationApplier};

/// Command to handle a webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header, if present.
    pub signature: Option<String>,
}

/// Result of a verified delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleWebhookResult {
    pub event_id: EventId,
    pub event_type: String,
    pub outcome: ApplyOutcome,
}

/// Handler for inbound webhooks.
///
/// Verification failures are returned as errors; everything after
/// verification is an [`ApplyOutcome`], including a timed-out apply.
#[derive(Clone)]
pub struct HandleWebhookHandler {
    verifier: WebhookVerifier,
    applier: ReconciliationApplier,
    apply_timeout: Duration,
}

impl HandleWebhookHandler {
    pub fn new(
        verifier: WebhookVerifier,
        applier: ReconciliationApplier,
        apply_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            applier,
            apply_timeout,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleWebhookCommand,
    ) -> Result<HandleWebhookResult, VerificationError> {
        let signature = cmd.signature.ok_or(VerificationError::MissingHeader)?;

        let event = self
            .verifier
            .verify(&cmd.payload, &signature)
            .map_err(|e| {
                tracing::warn!(error = %e, "Webhook rejected");
                e
            })?;

        let applied = tokio::time::timeout(self.apply_timeout, self.applier.apply(&event)).await;
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    event_id = %event.id,
                    timeout_ms = self.apply_timeout.as_millis() as u64,
                    "Webhook apply timed out"
                );
                ApplyOutcome::Failed(FailureReason::Transient)
            }
        };

        Ok(HandleWebhookResult {
            event_type: event.kind.type_name().to_string(),
            event_id: event.id,
            outcome,
        })
    }
}
