use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Outcome of a payment attempt. Paid is terminal: a later Failed event for
/// the same payment intent never downgrades it. Failed may be promoted to
/// Paid when the payment succeeds on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeType {
    Paid,
    Failed,
    Pending,
}

/// Point-in-time copy of the journey state that was live when the payment
/// was correlated. Write-once: never mutated after the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneySnapshot {
    pub content_version_id: String,
    pub page_type: String,
    pub hypothesis: Option<String>,
    /// Journey start (unix seconds); basis for conversion duration.
    pub started_at: i64,
}

/// The durable link between one payment attempt and one client journey.
/// At most one record exists per `payment_intent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub id: String,
    pub payment_intent_id: String,
    /// None when the event's client reference did not resolve.
    pub client_id: Option<String>,
    /// Raw reference from the event metadata, kept for manual review.
    pub client_reference: String,
    pub outcome: OutcomeType,
    pub journey_snapshot: Option<JourneySnapshot>,
    /// `received_at - started_at`, computed only when the record becomes
    /// Paid and a snapshot exists.
    pub conversion_duration_seconds: Option<i64>,
    pub amount_minor_units: i64,
    pub currency: String,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
    /// Every delivery event id that matched this payment intent, in arrival
    /// order. Set semantics: re-adding an id is a no-op.
    pub source_event_ids: Vec<String>,
    /// Flagged when the record could not be attributed to a journey.
    pub needs_review: bool,
    /// Optimistic-concurrency counter; bumped on every update.
    pub version: i64,
    pub correlated_at: i64,
    pub updated_at: i64,
}

impl CorrelationRecord {
    pub fn has_source_event(&self, event_id: &str) -> bool {
        self.source_event_ids.iter().any(|id| id == event_id)
    }
}
