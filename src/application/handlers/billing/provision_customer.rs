//! ProvisionCustomerHandler - gives a new account its Stripe customer.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{AccountId, CustomerId};
use crate::ports::{AccountDirectory, CreateCustomerRequest, DirectoryError, PaymentProvider};

/// Command to provision the processor customer for an account.
#[derive(Debug, Clone)]
pub struct ProvisionCustomerCommand {
    pub account_id: AccountId,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionCustomerResult {
    pub account_id: AccountId,
    pub customer_id: CustomerId,
    /// False when the account was already linked and nothing was created.
    pub newly_linked: bool,
}

/// Idempotency key for the customer-create call. Stable per account so
/// retried or concurrent triggers converge on one customer.
pub fn provisioning_key(account_id: &AccountId) -> String {
    format!("provision-customer-{}", account_id)
}

/// Handler for the account-creation trigger.
pub struct ProvisionCustomerHandler {
    directory: Arc<dyn AccountDirectory>,
    payment_provider: Arc<dyn PaymentProvider>,
}

impl ProvisionCustomerHandler {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            directory,
            payment_provider,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProvisionCustomerCommand,
    ) -> Result<ProvisionCustomerResult, BillingError> {
        let record = self
            .directory
            .create_account(&cmd.account_id, cmd.email.as_deref())
            .await?;

        if let Some(customer_id) = record.processor_customer_id {
            tracing::debug!(
                account_id = %cmd.account_id,
                %customer_id,
                "Account already provisioned"
            );
            return Ok(ProvisionCustomerResult {
                account_id: cmd.account_id,
                customer_id,
                newly_linked: false,
            });
        }

        let customer = self
            .payment_provider
            .create_customer(CreateCustomerRequest {
                account_id: cmd.account_id.clone(),
                email: cmd.email.or(record.email),
                idempotency_key: provisioning_key(&cmd.account_id),
            })
            .await?;

        match self
            .directory
            .link_customer(&cmd.account_id, &customer.id)
            .await
        {
            Ok(()) => {}
            Err(DirectoryError::AlreadyLinked { account_id, existing }) => {
                tracing::error!(
                    %account_id,
                    existing_customer_id = %existing,
                    requested_customer_id = %customer.id,
                    "Account already linked to a different customer"
                );
                return Err(BillingError::AlreadyLinked {
                    account_id,
                    existing,
                    requested: customer.id,
                });
            }
            Err(DirectoryError::CustomerAlreadyClaimed(customer_id)) => {
                tracing::error!(
                    account_id = %cmd.account_id,
                    %customer_id,
                    "Customer already linked to another account"
                );
                return Err(BillingError::CustomerAlreadyClaimed(customer_id));
            }
            Err(other) => return Err(other.into()),
        }

        tracing::info!(
            account_id = %cmd.account_id,
            customer_id = %customer.id,
            "Customer provisioned"
        );

        Ok(ProvisionCustomerResult {
            account_id: cmd.account_id,
            customer_id: customer.id,
            newly_linked: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::adapters::memory::InMemoryAccountDirectory;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::SubscriptionStatus;
    use crate::ports::{PaymentError, PaymentErrorCode};

    fn account_id() -> AccountId {
        AccountId::new("user-1").unwrap()
    }

    fn command() -> ProvisionCustomerCommand {
        ProvisionCustomerCommand {
            account_id: account_id(),
            email: Some("a@example.com".into()),
        }
    }

    fn handler(
        directory: &InMemoryAccountDirectory,
        provider: &MockPaymentProvider,
    ) -> ProvisionCustomerHandler {
        ProvisionCustomerHandler::new(Arc::new(directory.clone()), Arc::new(provider.clone()))
    }

    // ══════════════════════════════════════════════════════════════
    // Success Cases
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn provisions_and_links_new_account() {
        let directory = InMemoryAccountDirectory::new();
        let provider = MockPaymentProvider::new();

        let result = handler(&directory, &provider).handle(command()).await.unwrap();

        assert!(result.newly_linked);
        let record = directory.find_by_account_id(&account_id()).await.unwrap().unwrap();
        assert_eq!(record.processor_customer_id, Some(result.customer_id));
        assert_eq!(record.subscription_status, SubscriptionStatus::None);
        assert_eq!(record.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn uses_stable_idempotency_key() {
        let directory = InMemoryAccountDirectory::new();
        let provider = MockPaymentProvider::new();

        handler(&directory, &provider).handle(command()).await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls[0].args[1], "provision-customer-user-1");
    }

    #[tokio::test]
    async fn second_provision_returns_existing_customer_without_calling_provider() {
        let directory = InMemoryAccountDirectory::new();
        let provider = MockPaymentProvider::new();
        let handler = handler(&directory, &provider);

        let first = handler.handle(command()).await.unwrap();
        let second = handler.handle(command()).await.unwrap();

        assert_eq!(first.customer_id, second.customer_id);
        assert!(!second.newly_linked);
        assert_eq!(provider.call_count("create_customer"), 1);
    }

    #[tokio::test]
    async fn retry_after_provider_timeout_creates_one_customer() {
        let directory = InMemoryAccountDirectory::new();
        let provider = MockPaymentProvider::new();
        let handler = handler(&directory, &provider);
        provider.set_method_error("create_customer", PaymentError::timeout("slow"));

        let err = handler.handle(command()).await.unwrap_err();
        assert!(err.is_retryable());

        handler.handle(command()).await.unwrap();
        assert_eq!(provider.customer_count(), 1);
    }

    // ══════════════════════════════════════════════════════════════
    // Error Cases
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn customer_claimed_by_other_account_is_integrity_fault() {
        let directory = InMemoryAccountDirectory::new();
        let provider = MockPaymentProvider::new();
        let handler = handler(&directory, &provider);
        // A fresh mock restarts its id sequence, so user-2 is handed the
        // customer already linked to user-1.
        let first = handler.handle(command()).await.unwrap();
        let other = AccountId::new("user-2").unwrap();
        directory.create_account(&other, None).await.unwrap();

        let result = ProvisionCustomerHandler::new(
            Arc::new(directory.clone()),
            Arc::new(MockPaymentProvider::new()),
        )
        .handle(ProvisionCustomerCommand {
            account_id: other,
            email: None,
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err, BillingError::CustomerAlreadyClaimed(first.customer_id));
        assert!(err.is_integrity_fault());
    }

    #[tokio::test]
    async fn provider_rejection_surfaces() {
        let directory = InMemoryAccountDirectory::new();
        let provider = MockPaymentProvider::new();
        provider.set_method_error(
            "create_customer",
            PaymentError::new(PaymentErrorCode::AuthenticationError, "bad key"),
        );

        let err = handler(&directory, &provider).handle(command()).await.unwrap_err();

        assert!(matches!(err, BillingError::Internal(_)));
        let record = directory.find_by_account_id(&account_id()).await.unwrap().unwrap();
        assert!(!record.is_linked());
    }
}
