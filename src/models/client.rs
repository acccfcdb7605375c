use serde::{Deserialize, Serialize};

use super::OutcomeType;

/// Read view of a client, as exposed by the client repository. The client
/// entity is owned by the client service; this engine never mutates identity
/// fields, only the payment projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    /// Business token embedded in payment event metadata.
    pub reference: String,
    pub display_name: Option<String>,
}

/// The narrow payment-status projection this engine writes back onto the
/// client entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProjection {
    pub outcome: OutcomeType,
    pub amount_minor_units: i64,
    pub currency: String,
    pub updated_at: i64,
}

/// Input for creating a client row in the reference store (seed and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClient {
    pub reference: String,
    pub display_name: Option<String>,
}
