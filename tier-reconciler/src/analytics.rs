//! Analytics events emitted by the reconciler.
//!
//! One event is emitted per terminal transition:
//! `{"name":"checkout_completed","tier":..}` on success and
//! `{"name":"error","area":"checkout"}` on failure.
//!
//! [`TracingAnalytics`] writes events to the `analytics` tracing target so they can
//! be routed to a separate sink, the same way audit trails are usually split off.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::account::Tier;

/// Area tag attached to checkout failures.
pub const CHECKOUT_AREA: &str = "checkout";

/// Analytics event payload.
///
/// # Examples
///
/// ```
/// use tier_reconciler::{account::Tier, analytics::AnalyticsEvent};
///
/// let event = AnalyticsEvent::CheckoutCompleted { tier: Tier::Pro };
/// assert_eq!(
///     serde_json::to_string(&event).unwrap(),
///     r#"{"name":"checkout_completed","tier":"pro"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    /// An upgrade was confirmed.
    CheckoutCompleted {
        /// Resulting tier.
        tier: Tier,
    },
    /// The reconciliation ended in error.
    Error {
        /// Product area; always [`CHECKOUT_AREA`] here.
        area: String,
    },
}

impl AnalyticsEvent {
    /// Checkout failure event.
    #[must_use]
    pub fn checkout_error() -> Self {
        Self::Error { area: CHECKOUT_AREA.to_owned() }
    }
}

/// Event plus the attempt it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRecord {
    /// When the event was emitted.
    pub occurred_at: DateTime<Utc>,
    /// Correlation id of the reconciliation attempt.
    pub attempt_id: Uuid,
    /// The event itself.
    #[serde(flatten)]
    pub event: AnalyticsEvent,
}

impl AnalyticsRecord {
    /// Stamps `event` with the current time.
    #[must_use]
    pub fn new(attempt_id: Uuid, event: AnalyticsEvent) -> Self {
        Self { occurred_at: Utc::now(), attempt_id, event }
    }
}

/// Destination for analytics events.
pub trait AnalyticsSink: Send + Sync {
    /// Records one event. Must not block.
    fn emit(&self, record: &AnalyticsRecord);
}

/// Sink logging each event as JSON on the `analytics` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn emit(&self, record: &AnalyticsRecord) {
        match serde_json::to_string(record) {
            Ok(json) => tracing::info!(
                target: "analytics",
                attempt_id = %record.attempt_id,
                event = %json,
                "ANALYTICS"
            ),
            Err(e) => tracing::warn!(
                target: "analytics",
                attempt_id = %record.attempt_id,
                error = %e,
                "failed to serialize analytics event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_wire_format() {
        let json = serde_json::to_string(&AnalyticsEvent::checkout_error()).unwrap();
        assert_eq!(json, r#"{"name":"error","area":"checkout"}"#);
    }

    #[test]
    fn test_record_flattens_event() {
        let attempt_id = Uuid::new_v4();
        let event = AnalyticsEvent::CheckoutCompleted { tier: Tier::Elite };
        let record = AnalyticsRecord::new(attempt_id, event);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "checkout_completed");
        assert_eq!(value["tier"], "elite");
        assert_eq!(value["attempt_id"], attempt_id.to_string());
        assert!(value["occurred_at"].is_string());
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        let record = AnalyticsRecord::new(Uuid::new_v4(), AnalyticsEvent::checkout_error());
        TracingAnalytics.emit(&record);
    }
}
