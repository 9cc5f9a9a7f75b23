//! HTTP handlers for billing endpoints.
//!
//! Thin wrappers that turn requests into commands, delegate to the
//! application handlers and map results onto status codes.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::billing::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, HandleWebhookCommand,
    HandleWebhookHandler, OpenBillingPortalCommand, OpenBillingPortalHandler,
    ProvisionCustomerCommand, ProvisionCustomerHandler,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::{AccountId, AuthenticatedUser, PlanId};
use crate::ports::{AccountDirectory, PaymentProvider};

use super::dto::{
    CreateSubscriptionRequest, CreateSubscriptionResponse, ErrorResponse, OpenPortalRequest,
    PortalResponse, ProvisionAccountRequest, ProvisionAccountResponse, WebhookAckResponse,
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for billing routes.
#[derive(Clone)]
pub struct BillingAppState {
    pub directory: Arc<dyn AccountDirectory>,
    pub payment_provider: Arc<dyn PaymentProvider>,
    pub webhook_handler: HandleWebhookHandler,
    /// Hosts the billing portal may return to. Empty allows any host.
    pub portal_return_hosts: Vec<String>,
}

impl BillingAppState {
    pub fn provision_customer_handler(&self) -> ProvisionCustomerHandler {
        ProvisionCustomerHandler::new(self.directory.clone(), self.payment_provider.clone())
    }

    pub fn create_subscription_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(self.directory.clone(), self.payment_provider.clone())
    }

    pub fn open_billing_portal_handler(&self) -> OpenBillingPortalHandler {
        OpenBillingPortalHandler::new(self.directory.clone(), self.payment_provider.clone())
            .with_allowed_return_hosts(self.portal_return_hosts.clone())
    }
}

/// Resolves the target account: the caller's own unless the body names one.
fn target_account(
    user: &AuthenticatedUser,
    requested: Option<String>,
) -> Result<AccountId, BillingError> {
    match requested {
        Some(raw) => Ok(AccountId::new(raw)?),
        None => Ok(user.id.clone()),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/stripe
///
/// 200 for applied and ignored events, 400 when verification fails, 500 on a
/// retryable failed apply so Stripe redelivers. An event for an unknown
/// customer is acknowledged with 200 and its failure reason.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BillingApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = HandleWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let result = state
        .webhook_handler
        .handle(cmd)
        .await
        .map_err(BillingError::from)?;

    let ack = WebhookAckResponse::from(&result);
    if result.outcome.wants_redelivery() {
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                "APPLY_FAILED",
                ack.reason.unwrap_or_else(|| "failed".to_string()),
            )),
        )
            .into_response());
    }

    Ok((StatusCode::OK, Json(ack)).into_response())
}

// ════════════════════════════════════════════════════════════════════════════════
// Internal
// ════════════════════════════════════════════════════════════════════════════════

/// POST /internal/accounts - account-creation trigger. Safe to re-run.
pub async fn provision_account(
    State(state): State<BillingAppState>,
    Json(request): Json<ProvisionAccountRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ProvisionCustomerCommand {
        account_id: AccountId::new(request.account_id).map_err(BillingError::from)?,
        email: request.email,
    };

    let result = state.provision_customer_handler().handle(cmd).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ProvisionAccountResponse::from(result)),
    ))
}

// ════════════════════════════════════════════════════════════════════════════════
// Gateway (authenticated)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/subscriptions
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateSubscriptionCommand {
        account_id: target_account(&user, request.account_id)?,
        plan_id: PlanId::new(request.plan_id).map_err(BillingError::from)?,
        idempotency_key: headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        caller: Some(user),
    };

    let result = state.create_subscription_handler().handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSubscriptionResponse::from(result)),
    ))
}

/// POST /api/billing/portal
pub async fn open_billing_portal(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<OpenPortalRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = OpenBillingPortalCommand {
        account_id: target_account(&user, request.account_id)?,
        return_url: request.return_url,
        caller: Some(user),
    };

    let result = state.open_billing_portal_handler().handle(cmd).await?;

    Ok(Json(PortalResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            BillingError::Verification(_) => (StatusCode::BAD_REQUEST, "VERIFICATION_FAILED"),
            BillingError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            BillingError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
            BillingError::AlreadyLinked { .. } => (StatusCode::CONFLICT, "ALREADY_LINKED"),
            BillingError::CustomerAlreadyClaimed(_) => {
                (StatusCode::CONFLICT, "CUSTOMER_ALREADY_CLAIMED")
            }
            BillingError::PreconditionFailed(_) => {
                (StatusCode::PRECONDITION_FAILED, "PRECONDITION_FAILED")
            }
            BillingError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            BillingError::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            BillingError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            BillingError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let err = &self.0;
        if err.is_integrity_fault() {
            tracing::error!(error = %err, code, "Billing data-integrity fault");
        } else if matches!(err, BillingError::Internal(_)) {
            tracing::error!(error = %err, "Billing request failed");
        } else if err.is_retryable() {
            tracing::warn!(error = %err, "Billing request unavailable");
        }

        (status, Json(ErrorResponse::new(code, self.0.public_message()))).into_response()
    }
}
