use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::EventKind;

/// How the delivery entered the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationOutcome {
    /// Signature checked against the shared secret.
    Verified,
    /// Synthesized via the dev simulation endpoint, no signature.
    Simulated,
}

/// What the engine did with a delivery. Recorded on the audit entry so the
/// log can be read without joining against correlations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditDisposition {
    /// A new correlation record was created.
    Correlated,
    /// An existing record was updated (promotion, failure, or new event id).
    Updated,
    /// Exact redelivery of an already-processed event id.
    Duplicate,
    /// The event asked for a forbidden transition (Paid -> Failed) and was
    /// recorded without changing the outcome.
    TransitionIgnored,
    /// Correlation failed with a retryable error; the provider will redeliver.
    Failed,
}

/// Append-only record of one received delivery, independent of whether
/// correlation succeeded. System-of-record for "what did the provider
/// actually send us"; never updated or deleted by this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub received_at: i64,
    pub verification_outcome: VerificationOutcome,
    pub event_id: String,
    pub payment_intent_id: String,
    pub event_kind: EventKind,
    pub client_reference: String,
    pub disposition: AuditDisposition,
    /// Raw request body, verbatim.
    pub raw_body: String,
}
