//! PostgreSQL implementation of AccountDirectory.
//!
//! Schema lives in `migrations/`. `accounts.processor_customer_id` carries a
//! unique constraint, and `applied_events` is the ledger that makes each
//! Stripe event id write at most once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{AccountRecord, FieldUpdate, SubscriptionFields, SubscriptionStatus};
use crate::domain::foundation::{
    AccountId, CustomerId, EventId, PlanId, SubscriptionId, Timestamp,
};
use crate::ports::{AccountDirectory, DirectoryError, WriteOutcome};

const CUSTOMER_UNIQUE_CONSTRAINT: &str = "accounts_processor_customer_id_key";

const SELECT_COLUMNS: &str = r#"
    account_id, email, processor_customer_id, subscription_id, subscription_status,
    plan_id, period_end, last_applied_event_id, last_applied_event_time,
    created_at, updated_at
"#;

/// PostgreSQL implementation of the AccountDirectory port.
pub struct PostgresAccountDirectory {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresAccountDirectory {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Runs `fut` under the query timeout, mapping both failure modes.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DirectoryError>
    where
        F: Future<Output = Result<T, DirectoryError>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Account directory query timed out"
                );
                Err(DirectoryError::Timeout(format!(
                    "{} exceeded {:?}",
                    operation, self.query_timeout
                )))
            }
        }
    }

    async fn fetch_by_account_id(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, DirectoryError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1",
            SELECT_COLUMNS
        ))
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("find account", e))?;

        row.map(AccountRecord::try_from).transpose()
    }
}

fn storage(operation: &str, e: sqlx::Error) -> DirectoryError {
    tracing::error!(operation, error = %e, "Account directory query failed");
    DirectoryError::storage(format!("Failed to {}: {}", operation, e))
}

/// Database row representation of an account.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    email: Option<String>,
    processor_customer_id: Option<String>,
    subscription_id: Option<String>,
    subscription_status: String,
    plan_id: Option<String>,
    period_end: Option<DateTime<Utc>>,
    last_applied_event_id: Option<String>,
    last_applied_event_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for AccountRecord {
    type Error = DirectoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |e: crate::domain::foundation::ValidationError| {
            DirectoryError::storage(format!("Corrupt account row: {}", e))
        };

        Ok(AccountRecord {
            account_id: AccountId::new(row.account_id).map_err(corrupt)?,
            email: row.email,
            processor_customer_id: row
                .processor_customer_id
                .map(CustomerId::new)
                .transpose()
                .map_err(corrupt)?,
            subscription_id: row
                .subscription_id
                .map(SubscriptionId::new)
                .transpose()
                .map_err(corrupt)?,
            subscription_status: SubscriptionStatus::parse(&row.subscription_status),
            plan_id: row.plan_id.map(PlanId::new).transpose().map_err(corrupt)?,
            period_end: row.period_end.map(Timestamp::from_datetime),
            last_applied_event_id: row
                .last_applied_event_id
                .map(EventId::new)
                .transpose()
                .map_err(corrupt)?,
            last_applied_event_time: row.last_applied_event_time.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Column values written by an update, in bind order.
struct UpdateColumns<'a> {
    subscription_id: Option<&'a str>,
    status: &'a str,
    plan_id: Option<&'a str>,
    period_end: Option<DateTime<Utc>>,
}

impl<'a> From<&'a SubscriptionFields> for UpdateColumns<'a> {
    fn from(fields: &'a SubscriptionFields) -> Self {
        match fields {
            SubscriptionFields::Set {
                subscription_id,
                status,
                plan_id,
                period_end,
            } => Self {
                subscription_id: Some(subscription_id.as_str()),
                status: status.as_str(),
                plan_id: plan_id.as_ref().map(PlanId::as_str),
                period_end: period_end.map(|t| *t.as_datetime()),
            },
            SubscriptionFields::Cleared => Self {
                subscription_id: None,
                status: SubscriptionStatus::Canceled.as_str(),
                plan_id: None,
                period_end: None,
            },
        }
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    async fn create_account(
        &self,
        account_id: &AccountId,
        email: Option<&str>,
    ) -> Result<AccountRecord, DirectoryError> {
        self.bounded("create_account", async {
            sqlx::query(
                r#"
                INSERT INTO accounts (account_id, email, subscription_status)
                VALUES ($1, $2, 'none')
                ON CONFLICT (account_id) DO NOTHING
                "#,
            )
            .bind(account_id.as_str())
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| storage("create account", e))?;

            self.fetch_by_account_id(account_id)
                .await?
                .ok_or_else(|| DirectoryError::NotFound(account_id.clone()))
        })
        .await
    }

    async fn find_by_account_id(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AccountRecord>, DirectoryError> {
        self.bounded("find_by_account_id", self.fetch_by_account_id(account_id))
            .await
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<AccountRecord>, DirectoryError> {
        self.bounded("find_by_customer_id", async {
            let row: Option<AccountRow> = sqlx::query_as(&format!(
                "SELECT {} FROM accounts WHERE processor_customer_id = $1",
                SELECT_COLUMNS
            ))
            .bind(customer_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("find account by customer", e))?;

            row.map(AccountRecord::try_from).transpose()
        })
        .await
    }

    async fn link_customer(
        &self,
        account_id: &AccountId,
        customer_id: &CustomerId,
    ) -> Result<(), DirectoryError> {
        self.bounded("link_customer", async {
            let result = sqlx::query(
                r#"
                UPDATE accounts
                SET processor_customer_id = $2, updated_at = now()
                WHERE account_id = $1 AND processor_customer_id IS NULL
                "#,
            )
            .bind(account_id.as_str())
            .bind(customer_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.constraint() == Some(CUSTOMER_UNIQUE_CONSTRAINT) {
                        return DirectoryError::CustomerAlreadyClaimed(customer_id.clone());
                    }
                }
                storage("link customer", e)
            })?;

            if result.rows_affected() == 1 {
                return Ok(());
            }

            // Nothing updated: either no such account or it is already linked.
            let record = self
                .fetch_by_account_id(account_id)
                .await?
                .ok_or_else(|| DirectoryError::NotFound(account_id.clone()))?;

            match record.processor_customer_id {
                Some(existing) if &existing == customer_id => Ok(()),
                Some(existing) => Err(DirectoryError::AlreadyLinked {
                    account_id: account_id.clone(),
                    existing,
                }),
                None => Err(DirectoryError::storage(
                    "customer link was not written and account is still unlinked",
                )),
            }
        })
        .await
    }

    async fn apply_update(
        &self,
        account_id: &AccountId,
        expected_last_event_id: Option<&EventId>,
        update: &FieldUpdate,
    ) -> Result<WriteOutcome, DirectoryError> {
        let columns = UpdateColumns::from(&update.fields);

        let outcome = self
            .bounded("apply_update", async {
                // Dropping the transaction on any early return (or on timeout)
                // rolls it back.
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| storage("begin transaction", e))?;

                let ledgered = sqlx::query(
                    r#"
                    INSERT INTO applied_events (event_id, account_id, event_time)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (event_id) DO NOTHING
                    "#,
                )
                .bind(update.event_id.as_str())
                .bind(account_id.as_str())
                .bind(update.event_time.as_datetime())
                .execute(&mut *tx)
                .await
                .map_err(|e| storage("record applied event", e))?;

                if ledgered.rows_affected() == 0 {
                    return Ok(WriteOutcome::AlreadyApplied);
                }

                let updated = sqlx::query(
                    r#"
                    UPDATE accounts SET
                        subscription_id = $3,
                        subscription_status = $4,
                        plan_id = $5,
                        period_end = $6,
                        last_applied_event_id = $7,
                        last_applied_event_time = $8,
                        updated_at = now()
                    WHERE account_id = $1
                      AND last_applied_event_id IS NOT DISTINCT FROM $2
                    "#,
                )
                .bind(account_id.as_str())
                .bind(expected_last_event_id.map(EventId::as_str))
                .bind(columns.subscription_id)
                .bind(columns.status)
                .bind(columns.plan_id)
                .bind(columns.period_end)
                .bind(update.event_id.as_str())
                .bind(update.event_time.as_datetime())
                .execute(&mut *tx)
                .await
                .map_err(|e| storage("apply update", e))?;

                if updated.rows_affected() == 0 {
                    return Ok(WriteOutcome::Conflict);
                }

                tx.commit()
                    .await
                    .map_err(|e| storage("commit update", e))?;
                Ok(WriteOutcome::Written)
            })
            .await?;

        // A zero-row update is a conflict only if the account exists.
        if outcome == WriteOutcome::Conflict
            && self.find_by_account_id(account_id).await?.is_none()
        {
            return Err(DirectoryError::NotFound(account_id.clone()));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> AccountRow {
        AccountRow {
            account_id: "user-1".to_string(),
            email: Some("a@example.com".to_string()),
            processor_customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            subscription_status: "past_due".to_string(),
            plan_id: Some("price_1".to_string()),
            period_end: Some(Utc::now()),
            last_applied_event_id: Some("evt_1".to_string()),
            last_applied_event_time: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_record() {
        let record = AccountRecord::try_from(row()).unwrap();

        assert_eq!(record.account_id.as_str(), "user-1");
        assert_eq!(record.processor_customer_id.unwrap().as_str(), "cus_1");
        assert_eq!(record.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(record.last_applied_event_id.unwrap().as_str(), "evt_1");
    }

    #[test]
    fn row_with_blank_id_is_storage_error() {
        let mut bad = row();
        bad.processor_customer_id = Some(String::new());

        assert!(matches!(
            AccountRecord::try_from(bad),
            Err(DirectoryError::Storage(_))
        ));
    }

    #[test]
    fn cleared_fields_write_canceled_and_nulls() {
        let columns = UpdateColumns::from(&SubscriptionFields::Cleared);

        assert_eq!(columns.status, "canceled");
        assert!(columns.subscription_id.is_none());
        assert!(columns.plan_id.is_none());
        assert!(columns.period_end.is_none());
    }

    #[test]
    fn set_fields_write_every_column() {
        let fields = SubscriptionFields::Set {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            status: SubscriptionStatus::Trialing,
            plan_id: Some(PlanId::new("price_1").unwrap()),
            period_end: Some(Timestamp::from_unix_secs(1_000).unwrap()),
        };

        let columns = UpdateColumns::from(&fields);

        assert_eq!(columns.subscription_id, Some("sub_1"));
        assert_eq!(columns.status, "trialing");
        assert_eq!(columns.plan_id, Some("price_1"));
        assert_eq!(columns.period_end.unwrap().timestamp(), 1_000);
    }
}
