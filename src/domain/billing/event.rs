//! Verified processor events.
//!
//! Stripe delivers a JSON envelope `{id, type, created, data: {object}}`.
//! Only the three subscription lifecycle types carry a payload we act on; every
//! other type is kept as `EventKind::Other` so callers can acknowledge it.

use serde::Deserialize;

use crate::domain::foundation::{CustomerId, EventId, PlanId, SubscriptionId, Timestamp};

use super::{SubscriptionStatus, VerificationError};

pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// An authenticated event from the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorEvent {
    pub id: EventId,
    /// Ordering key: when Stripe created the event.
    pub created: Timestamp,
    pub kind: EventKind,
}

/// Closed set of event kinds this service understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated(SubscriptionSnapshot),
    SubscriptionUpdated(SubscriptionSnapshot),
    SubscriptionDeleted(SubscriptionSnapshot),
    /// Any other event type, carried by name only.
    Other(String),
}

impl EventKind {
    /// The Stripe event type string.
    pub fn type_name(&self) -> &str {
        match self {
            EventKind::SubscriptionCreated(_) => SUBSCRIPTION_CREATED,
            EventKind::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            EventKind::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            EventKind::Other(name) => name,
        }
    }

    pub fn subscription(&self) -> Option<&SubscriptionSnapshot> {
        match self {
            EventKind::SubscriptionCreated(s)
            | EventKind::SubscriptionUpdated(s)
            | EventKind::SubscriptionDeleted(s) => Some(s),
            EventKind::Other(_) => None,
        }
    }
}

/// The subscription object as it stood when the event was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    /// Price of the first subscription item.
    pub plan_id: Option<PlanId>,
    pub current_period_end: Option<Timestamp>,
}

impl ProcessorEvent {
    /// Decodes an already-authenticated payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, VerificationError> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| VerificationError::MalformedPayload(e.to_string()))?;

        let id = EventId::new(raw.id).map_err(malformed)?;
        let created = Timestamp::from_unix_secs(raw.created).map_err(malformed)?;

        let kind = match raw.event_type.as_str() {
            SUBSCRIPTION_CREATED => EventKind::SubscriptionCreated(snapshot(raw.data)?),
            SUBSCRIPTION_UPDATED => EventKind::SubscriptionUpdated(snapshot(raw.data)?),
            SUBSCRIPTION_DELETED => EventKind::SubscriptionDeleted(snapshot(raw.data)?),
            _ => EventKind::Other(raw.event_type),
        };

        Ok(Self {
            id,
            created,
            kind,
        })
    }
}

fn malformed(e: impl std::fmt::Display) -> VerificationError {
    VerificationError::MalformedPayload(e.to_string())
}

fn snapshot(data: Option<RawEventData>) -> Result<SubscriptionSnapshot, VerificationError> {
    let object = data
        .map(|d| d.object)
        .ok_or_else(|| malformed("missing data.object"))?;
    let raw: RawSubscription = serde_json::from_value(object).map_err(malformed)?;

    let first_item = raw.items.data.into_iter().next();
    let plan_id = first_item
        .as_ref()
        .and_then(|item| item.price.as_ref())
        .map(|price| PlanId::new(price.id.clone()))
        .transpose()
        .map_err(malformed)?;

    // Newer API versions moved the billing period onto the items.
    let period_end = raw
        .current_period_end
        .or_else(|| first_item.as_ref().and_then(|item| item.current_period_end))
        .map(Timestamp::from_unix_secs)
        .transpose()
        .map_err(malformed)?;

    Ok(SubscriptionSnapshot {
        subscription_id: SubscriptionId::new(raw.id).map_err(malformed)?,
        customer_id: CustomerId::new(raw.customer.into_id()).map_err(malformed)?,
        status: SubscriptionStatus::parse(&raw.status),
        plan_id,
        current_period_end: period_end,
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    customer: RawCustomerRef,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    items: RawItems,
}

/// `customer` is an id string unless the sender expanded it.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCustomerRef {
    Id(String),
    Expanded { id: String },
}

impl RawCustomerRef {
    fn into_id(self) -> String {
        match self {
            RawCustomerRef::Id(id) | RawCustomerRef::Expanded { id } => id,
        }
    }
}

#[derive(Default, Deserialize)]
struct RawItems {
    #[serde(default)]
    data: Vec<RawItem>,
}

#[derive(Deserialize)]
struct RawItem {
    price: Option<RawPrice>,
    current_period_end: Option<i64>,
}

#[derive(Deserialize)]
struct RawPrice {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscription_event(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_704_067_200,
            "livemode": false,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn subscription_object() -> serde_json::Value {
        json!({
            "id": "sub_1",
            "object": "subscription",
            "customer": "cus_1",
            "status": "active",
            "current_period_end": 1_706_745_600,
            "items": { "object": "list", "data": [
                { "id": "si_1", "price": { "id": "price_1" } },
                { "id": "si_2", "price": { "id": "price_2" } }
            ]}
        })
    }

    #[test]
    fn decodes_subscription_created() {
        let event = ProcessorEvent::from_json(&subscription_event(
            SUBSCRIPTION_CREATED,
            subscription_object(),
        ))
        .unwrap();

        assert_eq!(event.id.as_str(), "evt_1");
        assert_eq!(event.created.as_unix_secs(), 1_704_067_200);
        let EventKind::SubscriptionCreated(sub) = &event.kind else {
            panic!("expected created, got {:?}", event.kind);
        };
        assert_eq!(sub.subscription_id.as_str(), "sub_1");
        assert_eq!(sub.customer_id.as_str(), "cus_1");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.plan_id.as_ref().unwrap().as_str(), "price_1");
        assert_eq!(sub.current_period_end.unwrap().as_unix_secs(), 1_706_745_600);
    }

    #[test]
    fn period_end_falls_back_to_first_item() {
        let object = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "trialing",
            "items": { "data": [
                { "price": { "id": "price_1" }, "current_period_end": 1_706_000_000 }
            ]}
        });
        let event =
            ProcessorEvent::from_json(&subscription_event(SUBSCRIPTION_UPDATED, object)).unwrap();

        let sub = event.kind.subscription().unwrap();
        assert_eq!(sub.current_period_end.unwrap().as_unix_secs(), 1_706_000_000);
    }

    #[test]
    fn missing_items_leave_plan_and_period_empty() {
        let object = json!({ "id": "sub_1", "customer": "cus_1", "status": "canceled" });
        let event =
            ProcessorEvent::from_json(&subscription_event(SUBSCRIPTION_DELETED, object)).unwrap();

        let sub = event.kind.subscription().unwrap();
        assert!(sub.plan_id.is_none());
        assert!(sub.current_period_end.is_none());
        assert_eq!(event.kind.type_name(), SUBSCRIPTION_DELETED);
    }

    #[test]
    fn expanded_customer_object_is_accepted() {
        let object = json!({
            "id": "sub_1",
            "customer": { "id": "cus_9", "object": "customer" },
            "status": "active"
        });
        let event =
            ProcessorEvent::from_json(&subscription_event(SUBSCRIPTION_UPDATED, object)).unwrap();

        assert_eq!(event.kind.subscription().unwrap().customer_id.as_str(), "cus_9");
    }

    #[test]
    fn other_event_types_are_kept_by_name() {
        let payload = serde_json::to_vec(&json!({
            "id": "evt_2",
            "type": "invoice.paid",
            "created": 1_704_067_200,
            "data": { "object": { "id": "in_1" } }
        }))
        .unwrap();

        let event = ProcessorEvent::from_json(&payload).unwrap();

        assert_eq!(event.kind, EventKind::Other("invoice.paid".to_string()));
        assert!(event.kind.subscription().is_none());
    }

    #[test]
    fn subscription_event_without_customer_is_malformed() {
        let object = json!({ "id": "sub_1", "status": "active" });
        let result = ProcessorEvent::from_json(&subscription_event(SUBSCRIPTION_CREATED, object));

        assert!(matches!(result, Err(VerificationError::MalformedPayload(_))));
    }

    #[test]
    fn subscription_event_without_data_is_malformed() {
        let payload = serde_json::to_vec(&json!({
            "id": "evt_3",
            "type": SUBSCRIPTION_CREATED,
            "created": 1_704_067_200
        }))
        .unwrap();

        let result = ProcessorEvent::from_json(&payload);

        assert!(matches!(result, Err(VerificationError::MalformedPayload(_))));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let result = ProcessorEvent::from_json(b"not json");
        assert!(matches!(result, Err(VerificationError::MalformedPayload(_))));
    }
}
