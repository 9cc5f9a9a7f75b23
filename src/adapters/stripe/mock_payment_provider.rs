//! Mock payment provider for testing.
//!
//! Provides a configurable mock implementation of `PaymentProvider` for unit
//! and integration tests. Supports:
//! - Idempotency-key replay, matching Stripe's semantics
//! - Error injection per method
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::billing::SubscriptionStatus;
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, CreatedSubscription, Customer,
    PaymentError, PaymentProvider, PortalSession,
};

/// Mock payment provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// mock.set_method_error("create_customer", PaymentError::timeout("slow"));
///
/// let result = mock.create_customer(request).await;
/// assert_eq!(mock.call_count("create_customer"), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockPaymentProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    /// Customers created so far, by idempotency key.
    customers_by_key: HashMap<String, Customer>,

    /// Subscriptions created so far, by idempotency key.
    subscriptions_by_key: HashMap<String, CreatedSubscription>,

    /// Status given to newly created subscriptions.
    subscription_status: Option<SubscriptionStatus>,

    /// When set, created subscriptions carry no client secret.
    omit_client_secret: bool,

    /// Errors by method name; consumed on use.
    method_errors: HashMap<String, PaymentError>,

    next_id: u64,

    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Fail the next call to `method` with `error`.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    /// Status reported by subsequent `create_subscription` calls (default `incomplete`).
    pub fn set_subscription_status(&self, status: SubscriptionStatus) {
        self.state().subscription_status = Some(status);
    }

    /// Simulate a subscription whose first invoice has no payment intent.
    pub fn omit_client_secret(&self) {
        self.state().omit_client_secret = true;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Number of distinct customers the provider holds.
    pub fn customer_count(&self) -> usize {
        self.state().customers_by_key.len()
    }
}

impl MockState {
    fn record(&mut self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        self.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        match self.method_errors.remove(method) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_mock{}", prefix, self.next_id)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut state = self.state();
        state.record(
            "create_customer",
            vec![request.account_id.to_string(), request.idempotency_key.clone()],
        )?;

        if let Some(existing) = state.customers_by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let raw_id = state.next_id("cus");
        let customer = Customer {
            id: CustomerId::new(raw_id).map_err(|e| PaymentError::invalid_request(e.to_string()))?,
            email: request.email,
        };
        state
            .customers_by_key
            .insert(request.idempotency_key, customer.clone());
        Ok(customer)
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<CreatedSubscription, PaymentError> {
        let mut state = self.state();
        state.record(
            "create_subscription",
            vec![request.customer_id.to_string(), request.plan_id.to_string()],
        )?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state.subscriptions_by_key.get(key) {
                return Ok(existing.clone());
            }
        }

        let raw_id = state.next_id("sub");
        let client_secret = if state.omit_client_secret {
            None
        } else {
            Some(format!("pi_{}_secret", raw_id))
        };
        let created = CreatedSubscription {
            id: SubscriptionId::new(raw_id)
                .map_err(|e| PaymentError::invalid_request(e.to_string()))?,
            status: state
                .subscription_status
                .clone()
                .unwrap_or(SubscriptionStatus::Incomplete),
            client_secret,
        };

        if let Some(key) = request.idempotency_key {
            state.subscriptions_by_key.insert(key, created.clone());
        }
        Ok(created)
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let mut state = self.state();
        state.record(
            "create_portal_session",
            vec![customer_id.to_string(), return_url.to_string()],
        )?;

        let id = state.next_id("bps");
        Ok(PortalSession {
            url: format!("https://billing.example.test/session/{}", id),
            id,
        })
    }
}
