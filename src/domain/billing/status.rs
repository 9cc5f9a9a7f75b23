//! Subscription status as mirrored from Stripe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription status stored on an account record.
///
/// Mirrors Stripe's subscription statuses plus `None` for accounts that have
/// never subscribed. Statuses Stripe adds later are preserved verbatim in
/// `Other` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    #[default]
    None,
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
    Other(String),
}

impl SubscriptionStatus {
    /// Parses a status string. Unknown values are kept as `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "trialing" => Self::Trialing,
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Other(s) => s,
        }
    }

    /// Whether a record in this status carries subscription fields
    /// (`subscription_id`, `plan_id`, `period_end`).
    pub fn has_subscription(&self) -> bool {
        !matches!(self, Self::None | Self::Canceled)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SubscriptionStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_round_trip_through_strings() {
        for s in [
            "none",
            "incomplete",
            "incomplete_expired",
            "trialing",
            "active",
            "past_due",
            "canceled",
            "unpaid",
            "paused",
        ] {
            assert_eq!(SubscriptionStatus::parse(s).as_str(), s);
        }
    }

    #[test]
    fn unknown_status_is_preserved_verbatim() {
        let status = SubscriptionStatus::parse("on_hold");
        assert_eq!(status, SubscriptionStatus::Other("on_hold".to_string()));
        assert_eq!(status.to_string(), "on_hold");
    }

    #[test]
    fn none_and_canceled_have_no_subscription() {
        assert!(!SubscriptionStatus::None.has_subscription());
        assert!(!SubscriptionStatus::Canceled.has_subscription());
        assert!(SubscriptionStatus::Active.has_subscription());
        assert!(SubscriptionStatus::PastDue.has_subscription());
        assert!(SubscriptionStatus::Other("on_hold".into()).has_subscription());
    }

    #[test]
    fn serializes_as_snake_case_string() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
