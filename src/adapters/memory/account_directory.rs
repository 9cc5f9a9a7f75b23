//! In-memory account directory.
//!
//! Same contract as the Postgres adapter, including the customer-id index and
//! the applied-event ledger. Useful for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{AccountRecord, FieldUpdate};
use crate::domain::foundation::{AccountId, CustomerId, EventId, Timestamp};
use crate::ports::{AccountDirectory, DirectoryError, WriteOutcome};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, AccountRecord>,
    by_customer: HashMap<CustomerId, AccountId>,
    applied_events: HashSet<EventId>,
}

/// In-memory implementation of [`AccountDirectory`].
///
/// Every operation takes the lock once and finishes without awaiting, so a
/// cancelled caller never leaves a half-applied write behind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountDirectory {
    state: Arc<RwLock<State>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    pub async fn applied_event_count(&self) -> usize {
        self.state.read().await.applied_events.len()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn create_account(
        &self,
        account_id: &AccountId,
        email: Option<&str>,
    ) -> Result<AccountRecord, DirectoryError> {
        let mut state = self.state.write().await;
        let record = state
            .accounts
            .entry(account_id.clone())
            .or_insert_with(|| {
                AccountRecord::new(account_id.clone(), email.map(str::to_string), Timestamp::now())
            });
        Ok(record.clone())
    }

    async fn find_by_account_id(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, DirectoryError> {
        Ok(self.state.read().await.accounts.get(account_id).cloned())
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<AccountRecord>, DirectoryError> {
        let state = self.state.read().await;
        Ok(state
            .by_customer
            .get(customer_id)
            .and_then(|account_id| state.accounts.get(account_id))
            .cloned())
    }

    async fn link_customer(
        &self,
        account_id: &AccountId,
        customer_id: &CustomerId,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.write().await;

        if let Some(owner) = state.by_customer.get(customer_id) {
            if owner != account_id {
                return Err(DirectoryError::CustomerAlreadyClaimed(customer_id.clone()));
            }
        }

        let record = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| DirectoryError::NotFound(account_id.clone()))?;

        match &record.processor_customer_id {
            Some(existing) if existing == customer_id => return Ok(()),
            Some(existing) => {
                return Err(DirectoryError::AlreadyLinked {
                    account_id: account_id.clone(),
                    existing: existing.clone(),
                })
            }
            None => {}
        }

        record.processor_customer_id = Some(customer_id.clone());
        record.updated_at = Timestamp::now();
        state
            .by_customer
            .insert(customer_id.clone(), account_id.clone());
        Ok(())
    }

    async fn apply_update(
        &self,
        account_id: &AccountId,
        expected_last_event_id: Option<&EventId>,
        update: &FieldUpdate,
    ) -> Result<WriteOutcome, DirectoryError> {
        let mut state = self.state.write().await;

        if state.applied_events.contains(&update.event_id) {
            return Ok(WriteOutcome::AlreadyApplied);
        }

        let record = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| DirectoryError::NotFound(account_id.clone()))?;

        if record.last_applied_event_id.as_ref() != expected_last_event_id {
            return Ok(WriteOutcome::Conflict);
        }

        record.apply(update, Timestamp::now());
        state.applied_events.insert(update.event_id.clone());
        Ok(WriteOutcome::Written)
    }
}
