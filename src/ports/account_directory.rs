//! Account directory port.
//!
//! Durable store of account records, keyed by account id and indexed by the
//! Stripe customer id. All writes are conditional so that concurrent event
//! deliveries serialize through the store rather than through process locks.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::billing::{AccountRecord, BillingError, FieldUpdate};
use crate::domain::foundation::{AccountId, CustomerId, EventId};

/// Port for the account record store.
///
/// Implementations bound every call with a timeout and report it as
/// [`DirectoryError::Timeout`].
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Inserts a record with status `none` if none exists. Returns the stored
    /// record either way; an existing record is not modified.
    async fn create_account(
        &self,
        account_id: &AccountId,
        email: Option<&str>,
    ) -> Result<AccountRecord, DirectoryError>;

    async fn find_by_account_id(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, DirectoryError>;

    /// Looks up through the unique secondary index on the customer id.
    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<AccountRecord>, DirectoryError>;

    /// Links a customer to an account.
    ///
    /// Idempotent for identical arguments. Fails with `AlreadyLinked` when the
    /// account holds a different customer and with `CustomerAlreadyClaimed`
    /// when the customer belongs to another account.
    async fn link_customer(
        &self,
        account_id: &AccountId,
        customer_id: &CustomerId,
    ) -> Result<(), DirectoryError>;

    /// Compare-and-set write of a projected update.
    ///
    /// Writes only if the record's `last_applied_event_id` still equals
    /// `expected_last_event_id`. The update and the applied-event ledger entry
    /// commit together or not at all.
    async fn apply_update(
        &self,
        account_id: &AccountId,
        expected_last_event_id: Option<&EventId>,
        update: &FieldUpdate,
    ) -> Result<WriteOutcome, DirectoryError>;
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The record changed since it was read; nothing was written.
    Conflict,
    /// The ledger already holds this event id; nothing was written.
    AlreadyApplied,
}

/// Errors from account directory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("Account {account_id} is already linked to customer {existing}")]
    AlreadyLinked {
        account_id: AccountId,
        existing: CustomerId,
    },

    #[error("Customer {0} is already linked to another account")]
    CustomerAlreadyClaimed(CustomerId),

    #[error("Directory operation timed out: {0}")]
    Timeout(String),

    #[error("Directory storage error: {0}")]
    Storage(String),
}

impl DirectoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// `AlreadyLinked` needs the requested customer to be meaningful, so callers
/// that can hit it map it themselves; here it falls through to `Internal`.
impl From<DirectoryError> for BillingError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => BillingError::AccountNotFound(id),
            DirectoryError::CustomerAlreadyClaimed(id) => BillingError::CustomerAlreadyClaimed(id),
            DirectoryError::Timeout(msg) => BillingError::Transient(msg),
            other @ (DirectoryError::AlreadyLinked { .. } | DirectoryError::Storage(_)) => {
                BillingError::Internal(other.to_string())
            }
        }
    }
}
