use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::OutcomeType;

/// Provider event kinds this engine handles. Anything else the provider
/// sends is acknowledged and dropped as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    PaymentSucceeded,
    PaymentFailed,
    CheckoutCompleted,
}

/// One webhook delivery, normalized out of the provider-specific payload.
///
/// Constructed once by the verifier and immutable from then on. `event_id`
/// identifies the delivery; `payment_intent_id` identifies the underlying
/// payment attempt and is stable across redeliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedPaymentEvent {
    pub event_id: String,
    pub payment_intent_id: String,
    pub kind: EventKind,
    /// Whether a checkout event reported `payment_status = "paid"`.
    /// Only meaningful for `CheckoutCompleted`.
    pub checkout_paid: Option<bool>,
    /// Amount in the smallest currency unit.
    pub amount_minor_units: i64,
    /// ISO currency code, lowercase.
    pub currency: String,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
    /// When this service accepted the delivery (unix seconds), not the
    /// provider's event-creation time.
    pub received_at: i64,
    /// Business client token from event metadata. Required at parse time;
    /// may still fail to resolve to a client.
    pub client_reference: String,
}

impl NormalizedPaymentEvent {
    /// The outcome this event implies on its own.
    pub fn outcome(&self) -> OutcomeType {
        match self.kind {
            EventKind::PaymentSucceeded => OutcomeType::Paid,
            EventKind::PaymentFailed => OutcomeType::Failed,
            EventKind::CheckoutCompleted => {
                if self.checkout_paid.unwrap_or(false) {
                    OutcomeType::Paid
                } else {
                    OutcomeType::Pending
                }
            }
        }
    }
}
