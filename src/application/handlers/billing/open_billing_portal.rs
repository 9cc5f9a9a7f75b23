//! OpenBillingPortalHandler - hands the caller a Stripe billing portal link.

use std::sync::Arc;

use url::Url;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{AccountId, AuthenticatedUser};
use crate::ports::{AccountDirectory, PaymentProvider};

use super::authorize;

/// Command to open a billing portal session.
#[derive(Debug, Clone)]
pub struct OpenBillingPortalCommand {
    pub caller: Option<AuthenticatedUser>,
    pub account_id: AccountId,
    /// Where Stripe sends the user when they leave the portal.
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenBillingPortalResult {
    /// Single-use portal URL.
    pub url: String,
}

/// Handler for billing portal sessions.
pub struct OpenBillingPortalHandler {
    directory: Arc<dyn AccountDirectory>,
    payment_provider: Arc<dyn PaymentProvider>,
    /// Hosts `return_url` may point at. Empty allows any host.
    allowed_return_hosts: Vec<String>,
}

impl OpenBillingPortalHandler {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            directory,
            payment_provider,
            allowed_return_hosts: Vec::new(),
        }
    }

    pub fn with_allowed_return_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_return_hosts = hosts;
        self
    }

    pub async fn handle(
        &self,
        cmd: OpenBillingPortalCommand,
    ) -> Result<OpenBillingPortalResult, BillingError> {
        authorize(cmd.caller.as_ref(), &cmd.account_id)?;
        self.validate_return_url(&cmd.return_url)?;

        let record = self
            .directory
            .find_by_account_id(&cmd.account_id)
            .await?
            .ok_or_else(|| BillingError::AccountNotFound(cmd.account_id.clone()))?;

        let customer_id = record.processor_customer_id.ok_or_else(|| {
            BillingError::precondition("Account has no billing customer yet")
        })?;

        let session = self
            .payment_provider
            .create_portal_session(&customer_id, &cmd.return_url)
            .await?;

        tracing::info!(
            account_id = %cmd.account_id,
            session_id = %session.id,
            "Billing portal opened"
        );

        Ok(OpenBillingPortalResult { url: session.url })
    }

    fn validate_return_url(&self, raw: &str) -> Result<(), BillingError> {
        let parsed = Url::parse(raw)
            .map_err(|e| BillingError::precondition(format!("Invalid return_url: {}", e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BillingError::precondition("return_url must use http or https"));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| BillingError::precondition("return_url must have a host"))?;

        if !self.allowed_return_hosts.is_empty()
            && !self.allowed_return_hosts.iter().any(|allowed| allowed == host)
        {
            return Err(BillingError::precondition(format!(
                "return_url host '{}' is not allowed",
                host
            )));
        }

        Ok(())
    }
}
