//! Pure projection of a processor event onto an account record.

use super::{
    AccountRecord, EventKind, FieldUpdate, ProcessorEvent, SubscriptionFields,
    SubscriptionSnapshot,
};

/// What an event means for one account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Write these fields.
    Update(FieldUpdate),
    /// Event type carries nothing we store.
    NoOp,
    /// Event is valid but must not be applied to this record.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Older than the event that last wrote the record.
    Stale,
    /// The same event already wrote the record.
    Duplicate,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Stale => "stale",
            RejectReason::Duplicate => "duplicate",
        }
    }
}

/// Maps `event` onto `current`.
///
/// Events that share the record's last-applied timestamp are applied, so a
/// later delivery within the same second wins. Only strictly older events
/// are stale.
pub fn project(event: &ProcessorEvent, current: &AccountRecord) -> Projection {
    let fields = match &event.kind {
        EventKind::SubscriptionCreated(sub) | EventKind::SubscriptionUpdated(sub) => {
            fields_for(sub)
        }
        EventKind::SubscriptionDeleted(_) => SubscriptionFields::Cleared,
        EventKind::Other(_) => return Projection::NoOp,
    };

    if current.last_applied_event_id.as_ref() == Some(&event.id) {
        return Projection::Rejected(RejectReason::Duplicate);
    }
    if let Some(last) = &current.last_applied_event_time {
        if event.created.is_before(last) {
            return Projection::Rejected(RejectReason::Stale);
        }
    }

    Projection::Update(FieldUpdate {
        fields,
        event_id: event.id.clone(),
        event_time: event.created,
    })
}

/// A created/updated snapshot whose status already ended the subscription is
/// projected like a deletion, so the cleared-together invariant holds.
fn fields_for(sub: &SubscriptionSnapshot) -> SubscriptionFields {
    if sub.status.has_subscription() {
        SubscriptionFields::Set {
            subscription_id: sub.subscription_id.clone(),
            status: sub.status.clone(),
            plan_id: sub.plan_id.clone(),
            period_end: sub.current_period_end,
        }
    } else {
        SubscriptionFields::Cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::SubscriptionStatus;
    use crate::domain::foundation::{
        AccountId, CustomerId, EventId, PlanId, SubscriptionId, Timestamp,
    };
    use proptest::prelude::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn snapshot(status: SubscriptionStatus) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: CustomerId::new("cus_1").unwrap(),
            status,
            plan_id: Some(PlanId::new("price_1").unwrap()),
            current_period_end: Some(ts(10_000)),
        }
    }

    fn event(id: &str, created: i64, kind: EventKind) -> ProcessorEvent {
        ProcessorEvent {
            id: EventId::new(id).unwrap(),
            created: ts(created),
            kind,
        }
    }

    fn linked_account() -> AccountRecord {
        let mut record = AccountRecord::new(AccountId::new("user-1").unwrap(), None, ts(0));
        record.processor_customer_id = Some(CustomerId::new("cus_1").unwrap());
        record
    }

    fn applied(mut record: AccountRecord, event: &ProcessorEvent) -> AccountRecord {
        if let Projection::Update(update) = project(event, &record) {
            record.apply(&update, ts(99_999));
        }
        record
    }

    // ══════════════════════════════════════════════════════════════
    // Event Types
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn created_on_fresh_account_sets_all_fields() {
        let record = linked_account();
        let e = event(
            "evt_1",
            1_000,
            EventKind::SubscriptionCreated(snapshot(SubscriptionStatus::Active)),
        );

        let Projection::Update(update) = project(&e, &record) else {
            panic!("expected update");
        };

        assert_eq!(
            update.fields,
            SubscriptionFields::Set {
                subscription_id: SubscriptionId::new("sub_1").unwrap(),
                status: SubscriptionStatus::Active,
                plan_id: Some(PlanId::new("price_1").unwrap()),
                period_end: Some(ts(10_000)),
            }
        );
        assert_eq!(update.event_id.as_str(), "evt_1");
        assert_eq!(update.event_time, ts(1_000));
    }

    #[test]
    fn deleted_clears_fields() {
        let e = event(
            "evt_2",
            2_000,
            EventKind::SubscriptionDeleted(snapshot(SubscriptionStatus::Canceled)),
        );

        let projection = project(&e, &linked_account());

        assert!(matches!(
            projection,
            Projection::Update(FieldUpdate {
                fields: SubscriptionFields::Cleared,
                ..
            })
        ));
    }

    #[test]
    fn updated_to_canceled_clears_fields() {
        let e = event(
            "evt_3",
            2_000,
            EventKind::SubscriptionUpdated(snapshot(SubscriptionStatus::Canceled)),
        );

        let Projection::Update(update) = project(&e, &linked_account()) else {
            panic!("expected update");
        };
        assert_eq!(update.fields, SubscriptionFields::Cleared);
    }

    #[test]
    fn other_event_types_are_noop() {
        let e = event("evt_4", 1_000, EventKind::Other("invoice.payment_failed".into()));
        assert_eq!(project(&e, &linked_account()), Projection::NoOp);
    }

    #[test]
    fn other_event_types_are_noop_even_when_stale() {
        let mut record = linked_account();
        record.last_applied_event_time = Some(ts(5_000));
        let e = event("evt_5", 1_000, EventKind::Other("customer.updated".into()));

        assert_eq!(project(&e, &record), Projection::NoOp);
    }

    // ══════════════════════════════════════════════════════════════
    // Ordering
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn older_event_is_stale() {
        let mut record = linked_account();
        record.last_applied_event_id = Some(EventId::new("evt_new").unwrap());
        record.last_applied_event_time = Some(ts(2_000));
        let e = event(
            "evt_old",
            1_999,
            EventKind::SubscriptionUpdated(snapshot(SubscriptionStatus::PastDue)),
        );

        assert_eq!(project(&e, &record), Projection::Rejected(RejectReason::Stale));
    }

    #[test]
    fn same_second_event_is_applied() {
        let mut record = linked_account();
        record.last_applied_event_id = Some(EventId::new("evt_a").unwrap());
        record.last_applied_event_time = Some(ts(2_000));
        let e = event(
            "evt_b",
            2_000,
            EventKind::SubscriptionUpdated(snapshot(SubscriptionStatus::PastDue)),
        );

        assert!(matches!(project(&e, &record), Projection::Update(_)));
    }

    #[test]
    fn redelivered_event_is_duplicate() {
        let e = event(
            "evt_1",
            1_000,
            EventKind::SubscriptionCreated(snapshot(SubscriptionStatus::Active)),
        );
        let record = applied(linked_account(), &e);

        assert_eq!(project(&e, &record), Projection::Rejected(RejectReason::Duplicate));
    }

    #[test]
    fn created_then_deleted_round_trip_ends_canceled() {
        let created = event(
            "evt_1",
            1_000,
            EventKind::SubscriptionCreated(snapshot(SubscriptionStatus::Active)),
        );
        let deleted = event(
            "evt_2",
            2_000,
            EventKind::SubscriptionDeleted(snapshot(SubscriptionStatus::Canceled)),
        );

        let record = applied(applied(linked_account(), &created), &deleted);

        assert_eq!(record.subscription_status, SubscriptionStatus::Canceled);
        assert!(record.subscription_id.is_none());
        assert!(record.plan_id.is_none());
        assert!(record.period_end.is_none());
    }

    fn status_strategy() -> impl Strategy<Value = SubscriptionStatus> {
        prop_oneof![
            Just(SubscriptionStatus::Active),
            Just(SubscriptionStatus::Trialing),
            Just(SubscriptionStatus::PastDue),
            Just(SubscriptionStatus::Unpaid),
            Just(SubscriptionStatus::Canceled),
        ]
    }

    proptest! {
        #[test]
        fn applying_newer_then_older_keeps_newer_state(
            t1 in 1i64..1_000_000,
            gap in 1i64..1_000_000,
            s1 in status_strategy(),
            s2 in status_strategy(),
        ) {
            let t2 = t1 + gap;
            let older = event("evt_older", t1, EventKind::SubscriptionUpdated(snapshot(s1)));
            let newer = event("evt_newer", t2, EventKind::SubscriptionUpdated(snapshot(s2)));

            let newer_only = applied(linked_account(), &newer);
            let reordered = applied(newer_only.clone(), &older);

            prop_assert_eq!(reordered, newer_only);
        }

        #[test]
        fn applying_an_event_twice_equals_applying_once(
            t in 1i64..1_000_000,
            s in status_strategy(),
        ) {
            let e = event("evt_1", t, EventKind::SubscriptionUpdated(snapshot(s)));

            let once = applied(linked_account(), &e);
            let twice = applied(once.clone(), &e);

            prop_assert_eq!(twice, once);
        }
    }
}
