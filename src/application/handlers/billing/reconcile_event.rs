//! ReconciliationApplier - applies one verified processor event to the
//! account it belongs to.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{
    project, ProcessorEvent, Projection, RejectReason, SubscriptionSnapshot,
};
use crate::ports::{AccountDirectory, DirectoryError, WriteOutcome};

/// Terminal result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Ignored(IgnoreReason),
    Failed(FailureReason),
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Applied => "applied",
            ApplyOutcome::Ignored(_) => "ignored",
            ApplyOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ApplyOutcome::Failed(_))
    }

    /// Whether the sender should deliver this event again.
    pub fn wants_redelivery(&self) -> bool {
        matches!(self, ApplyOutcome::Failed(reason) if reason.is_retryable())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    UnhandledEventType,
    Stale,
    Duplicate,
}

impl From<RejectReason> for IgnoreReason {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::Stale => IgnoreReason::Stale,
            RejectReason::Duplicate => IgnoreReason::Duplicate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No account is linked to the event's customer.
    UnknownCustomer,
    /// The record kept changing underneath two consecutive attempts.
    ConcurrentModification,
    /// A store call timed out.
    Transient,
    Internal,
}

impl FailureReason {
    /// An unknown customer needs an operator; redelivering repeats the failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::UnknownCustomer)
    }
}

/// One read-project-write pass.
enum Attempt {
    Done(ApplyOutcome),
    Conflict,
}

/// Applies verified events to account records.
///
/// Holds no mutable state; concurrent calls for the same customer serialize
/// through the directory's compare-and-set write.
#[derive(Clone)]
pub struct ReconciliationApplier {
    directory: Arc<dyn AccountDirectory>,
}

impl ReconciliationApplier {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self { directory }
    }

    pub async fn apply(&self, event: &ProcessorEvent) -> ApplyOutcome {
        let Some(subscription) = event.kind.subscription() else {
            tracing::debug!(
                event_id = %event.id,
                event_type = event.kind.type_name(),
                "Event type not reconciled"
            );
            return ApplyOutcome::Ignored(IgnoreReason::UnhandledEventType);
        };

        let outcome = match self.attempt(event, subscription).await {
            Ok(Attempt::Done(outcome)) => outcome,
            Ok(Attempt::Conflict) => {
                tracing::debug!(
                    event_id = %event.id,
                    "Account changed during apply, retrying once"
                );
                match self.attempt(event, subscription).await {
                    Ok(Attempt::Done(outcome)) => outcome,
                    Ok(Attempt::Conflict) => {
                        tracing::warn!(
                            event_id = %event.id,
                            customer_id = %subscription.customer_id,
                            "Account changed during both apply attempts"
                        );
                        ApplyOutcome::Failed(FailureReason::ConcurrentModification)
                    }
                    Err(e) => failure_from(event, e),
                }
            }
            Err(e) => failure_from(event, e),
        };

        tracing::info!(
            event_id = %event.id,
            event_type = event.kind.type_name(),
            customer_id = %subscription.customer_id,
            outcome = outcome.as_str(),
            "Event reconciled"
        );
        outcome
    }

    async fn attempt(
        &self,
        event: &ProcessorEvent,
        subscription: &SubscriptionSnapshot,
    ) -> Result<Attempt, DirectoryError> {
        let Some(record) = self
            .directory
            .find_by_customer_id(&subscription.customer_id)
            .await?
        else {
            tracing::error!(
                event_id = %event.id,
                event_type = event.kind.type_name(),
                customer_id = %subscription.customer_id,
                subscription_id = %subscription.subscription_id,
                "No account linked to customer"
            );
            return Ok(Attempt::Done(ApplyOutcome::Failed(FailureReason::UnknownCustomer)));
        };

        let update = match project(event, &record) {
            Projection::Update(update) => update,
            Projection::NoOp => {
                return Ok(Attempt::Done(ApplyOutcome::Ignored(
                    IgnoreReason::UnhandledEventType,
                )))
            }
            Projection::Rejected(reason) => {
                tracing::debug!(
                    event_id = %event.id,
                    account_id = %record.account_id,
                    reason = reason.as_str(),
                    "Event not applied"
                );
                return Ok(Attempt::Done(ApplyOutcome::Ignored(reason.into())));
            }
        };

        let written = self
            .directory
            .apply_update(&record.account_id, record.last_applied_event_id.as_ref(), &update)
            .await?;

        Ok(match written {
            WriteOutcome::Written => Attempt::Done(ApplyOutcome::Applied),
            WriteOutcome::AlreadyApplied => {
                tracing::debug!(
                    event_id = %event.id,
                    account_id = %record.account_id,
                    "Event already in ledger"
                );
                Attempt::Done(ApplyOutcome::Ignored(IgnoreReason::Duplicate))
            }
            WriteOutcome::Conflict => Attempt::Conflict,
        })
    }
}

fn failure_from(event: &ProcessorEvent, err: DirectoryError) -> ApplyOutcome {
    match err {
        DirectoryError::Timeout(detail) => {
            tracing::warn!(event_id = %event.id, %detail, "Directory timed out during apply");
            ApplyOutcome::Failed(FailureReason::Transient)
        }
        other => {
            tracing::error!(event_id = %event.id, error = %other, "Directory failed during apply");
            ApplyOutcome::Failed(FailureReason::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::adapters::memory::InMemoryAccountDirectory;
    use crate::domain::billing::{AccountRecord, EventKind, FieldUpdate, SubscriptionStatus};
    use crate::domain::foundation::{
        AccountId, CustomerId, EventId, PlanId, SubscriptionId, Timestamp,
    };

    // ══════════════════════════════════════════════════════════════
    // Fixtures
    // ══════════════════════════════════════════════════════════════

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn snapshot(customer: &str, status: SubscriptionStatus) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: CustomerId::new(customer).unwrap(),
            status,
            plan_id: Some(PlanId::new("price_1").unwrap()),
            current_period_end: Some(ts(50_000)),
        }
    }

    fn created(id: &str, at: i64, status: SubscriptionStatus) -> ProcessorEvent {
        ProcessorEvent {
            id: EventId::new(id).unwrap(),
            created: ts(at),
            kind: EventKind::SubscriptionCreated(snapshot("cus_1", status)),
        }
    }

    fn deleted(id: &str, at: i64) -> ProcessorEvent {
        ProcessorEvent {
            id: EventId::new(id).unwrap(),
            created: ts(at),
            kind: EventKind::SubscriptionDeleted(snapshot("cus_1", SubscriptionStatus::Canceled)),
        }
    }

    async fn linked_directory() -> InMemoryAccountDirectory {
        let directory = InMemoryAccountDirectory::new();
        let id = AccountId::new("user-1").unwrap();
        directory.create_account(&id, None).await.unwrap();
        directory
            .link_customer(&id, &CustomerId::new("cus_1").unwrap())
            .await
            .unwrap();
        directory
    }

    async fn record(directory: &InMemoryAccountDirectory) -> AccountRecord {
        directory
            .find_by_account_id(&AccountId::new("user-1").unwrap())
            .await
            .unwrap()
            .unwrap()
    }

    /// Reports `Conflict` for the first `conflicts` writes, then delegates.
    struct ConflictingDirectory {
        inner: InMemoryAccountDirectory,
        conflicts: AtomicUsize,
        writes: AtomicUsize,
    }

    impl ConflictingDirectory {
        fn new(inner: InMemoryAccountDirectory, conflicts: usize) -> Self {
            Self {
                inner,
                conflicts: AtomicUsize::new(conflicts),
                writes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AccountDirectory for ConflictingDirectory {
        async fn create_account(
            &self,
            account_id: &AccountId,
            email: Option<&str>,
        ) -> Result<AccountRecord, DirectoryError> {
            self.inner.create_account(account_id, email).await
        }

        async fn find_by_account_id(
            &self,
            account_id: &AccountId,
        ) -> Result<Option<AccountRecord>, DirectoryError> {
            self.inner.find_by_account_id(account_id).await
        }

        async fn find_by_customer_id(
            &self,
            customer_id: &CustomerId,
        ) -> Result<Option<AccountRecord>, DirectoryError> {
            self.inner.find_by_customer_id(customer_id).await
        }

        async fn link_customer(
            &self,
            account_id: &AccountId,
            customer_id: &CustomerId,
        ) -> Result<(), DirectoryError> {
            self.inner.link_customer(account_id, customer_id).await
        }

        async fn apply_update(
            &self,
            account_id: &AccountId,
            expected_last_event_id: Option<&EventId>,
            update: &FieldUpdate,
        ) -> Result<WriteOutcome, DirectoryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(WriteOutcome::Conflict);
            }
            self.inner
                .apply_update(account_id, expected_last_event_id, update)
                .await
        }
    }

    /// Every call times out.
    struct TimingOutDirectory;

    #[async_trait]
    impl AccountDirectory for TimingOutDirectory {
        async fn create_account(
            &self,
            _account_id: &AccountId,
            _email: Option<&str>,
        ) -> Result<AccountRecord, DirectoryError> {
            Err(DirectoryError::Timeout("create_account".into()))
        }

        async fn find_by_account_id(
            &self,
            _account_id: &AccountId,
        ) -> Result<Option<AccountRecord>, DirectoryError> {
            Err(DirectoryError::Timeout("find_by_account_id".into()))
        }

        async fn find_by_customer_id(
            &self,
            _customer_id: &CustomerId,
        ) -> Result<Option<AccountRecord>, DirectoryError> {
            Err(DirectoryError::Timeout("find_by_customer_id".into()))
        }

        async fn link_customer(
            &self,
            _account_id: &AccountId,
            _customer_id: &CustomerId,
        ) -> Result<(), DirectoryError> {
            Err(DirectoryError::Timeout("link_customer".into()))
        }

        async fn apply_update(
            &self,
            _account_id: &AccountId,
            _expected_last_event_id: Option<&EventId>,
            _update: &FieldUpdate,
        ) -> Result<WriteOutcome, DirectoryError> {
            Err(DirectoryError::Timeout("apply_update".into()))
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Applied
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn created_event_populates_record() {
        let directory = linked_directory().await;
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));

        let outcome = applier
            .apply(&created("evt_1", 1_000, SubscriptionStatus::Active))
            .await;

        assert_eq!(outcome, ApplyOutcome::Applied);
        let record = record(&directory).await;
        assert_eq!(record.subscription_id, Some(SubscriptionId::new("sub_1").unwrap()));
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
        assert_eq!(record.plan_id, Some(PlanId::new("price_1").unwrap()));
        assert_eq!(record.period_end, Some(ts(50_000)));
    }

    #[tokio::test]
    async fn created_then_deleted_clears_subscription() {
        let directory = linked_directory().await;
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));

        applier.apply(&created("evt_1", 1_000, SubscriptionStatus::Active)).await;
        let outcome = applier.apply(&deleted("evt_2", 2_000)).await;

        assert_eq!(outcome, ApplyOutcome::Applied);
        let record = record(&directory).await;
        assert_eq!(record.subscription_status, SubscriptionStatus::Canceled);
        assert!(record.subscription_id.is_none());
        assert!(record.plan_id.is_none());
        assert!(record.period_end.is_none());
    }

    // ══════════════════════════════════════════════════════════════
    // Ignored
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unhandled_event_type_touches_nothing() {
        let directory = linked_directory().await;
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));
        let before = record(&directory).await;

        let outcome = applier
            .apply(&ProcessorEvent {
                id: EventId::new("evt_x").unwrap(),
                created: ts(1_000),
                    kind: EventKind::Other("invoice.payment_failed".into()),
            })
            .await;

        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::UnhandledEventType));
        assert_eq!(record(&directory).await, before);
    }

    #[tokio::test]
    async fn same_event_twice_is_duplicate() {
        let directory = linked_directory().await;
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));
        let event = created("evt_1", 1_000, SubscriptionStatus::Active);

        applier.apply(&event).await;
        let after_first = record(&directory).await;
        let outcome = applier.apply(&event).await;

        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::Duplicate));
        assert_eq!(record(&directory).await, after_first);
    }

    #[tokio::test]
    async fn older_event_after_newer_is_stale() {
        let directory = linked_directory().await;
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));

        applier.apply(&deleted("evt_2", 2_000)).await;
        let outcome = applier
            .apply(&created("evt_1", 1_000, SubscriptionStatus::Active))
            .await;

        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(record(&directory).await.subscription_status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn redelivered_superseded_event_is_stale() {
        let directory = linked_directory().await;
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));
        let first = created("evt_1", 1_000, SubscriptionStatus::Active);

        applier.apply(&first).await;
        applier.apply(&deleted("evt_2", 2_000)).await;
        let outcome = applier.apply(&first).await;

        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(directory.applied_event_count().await, 2);
    }

    // ══════════════════════════════════════════════════════════════
    // Failed
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_customer_fails_without_writing() {
        let directory = InMemoryAccountDirectory::new();
        let applier = ReconciliationApplier::new(Arc::new(directory.clone()));

        let outcome = applier
            .apply(&created("evt_1", 1_000, SubscriptionStatus::Active))
            .await;

        assert_eq!(outcome, ApplyOutcome::Failed(FailureReason::UnknownCustomer));
        assert!(!outcome.wants_redelivery());
        assert_eq!(directory.applied_event_count().await, 0);
    }

    #[test]
    fn only_retryable_failures_want_redelivery() {
        assert!(ApplyOutcome::Failed(FailureReason::ConcurrentModification).wants_redelivery());
        assert!(ApplyOutcome::Failed(FailureReason::Transient).wants_redelivery());
        assert!(ApplyOutcome::Failed(FailureReason::Internal).wants_redelivery());
        assert!(!ApplyOutcome::Failed(FailureReason::UnknownCustomer).wants_redelivery());
        assert!(!ApplyOutcome::Applied.wants_redelivery());
        assert!(!ApplyOutcome::Ignored(IgnoreReason::Stale).wants_redelivery());
    }

    #[tokio::test]
    async fn single_conflict_is_retried() {
        let directory = ConflictingDirectory::new(linked_directory().await, 1);
        let applier = ReconciliationApplier::new(Arc::new(directory));

        let outcome = applier
            .apply(&created("evt_1", 1_000, SubscriptionStatus::Active))
            .await;

        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn second_conflict_is_concurrent_modification() {
        let directory = Arc::new(ConflictingDirectory::new(linked_directory().await, 2));
        let applier = ReconciliationApplier::new(directory.clone());

        let outcome = applier
            .apply(&created("evt_1", 1_000, SubscriptionStatus::Active))
            .await;

        assert_eq!(outcome, ApplyOutcome::Failed(FailureReason::ConcurrentModification));
        assert_eq!(directory.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn directory_timeout_is_transient() {
        let applier = ReconciliationApplier::new(Arc::new(TimingOutDirectory));

        let outcome = applier
            .apply(&created("evt_1", 1_000, SubscriptionStatus::Active))
            .await;

        assert_eq!(outcome, ApplyOutcome::Failed(FailureReason::Transient));
    }

    #[test]
    fn outcome_serializes_with_reason() {
        let json = serde_json::to_value(ApplyOutcome::Ignored(IgnoreReason::Stale)).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "ignored", "reason": "stale"}));
    }
}
