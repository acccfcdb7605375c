//! Dev-only simulation endpoint.
//!
//! Synthesizes a normalized event directly from a simplified request body,
//! bypassing signature verification. Wired into the router only in dev mode;
//! the audit trail marks these deliveries as simulated.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::webhooks::handle_event;
use crate::db::{queries, AppState};
use crate::models::{EventKind, NormalizedPaymentEvent, VerificationOutcome};

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    /// One of: "succeed", "fail", "checkout", "checkout_paid"
    pub action: String,
    pub client_reference: String,
    #[serde(default)]
    pub payment_data: SimulatePaymentData,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulatePaymentData {
    pub payment_intent_id: Option<String>,
    pub amount_minor_units: Option<i64>,
    pub currency: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
}

#[derive(Serialize)]
struct SimulateResponse {
    message: &'static str,
    event_id: String,
    payment_intent_id: String,
}

pub async fn simulate_payment_event(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> impl IntoResponse {
    let (kind, checkout_paid) = match req.action.as_str() {
        "succeed" => (EventKind::PaymentSucceeded, None),
        "fail" => (EventKind::PaymentFailed, None),
        "checkout" => (EventKind::CheckoutCompleted, Some(false)),
        "checkout_paid" => (EventKind::CheckoutCompleted, Some(true)),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Unknown action: {}", other),
            )
                .into_response();
        }
    };

    let (failure_reason, failure_code) = if kind == EventKind::PaymentFailed {
        (
            req.payment_data.failure_reason.clone(),
            req.payment_data.failure_code.clone(),
        )
    } else {
        (None, None)
    };

    let event = NormalizedPaymentEvent {
        event_id: format!("evt_sim_{}", Uuid::new_v4().as_simple()),
        payment_intent_id: req
            .payment_data
            .payment_intent_id
            .clone()
            .unwrap_or_else(|| format!("pi_sim_{}", Uuid::new_v4().as_simple())),
        kind,
        checkout_paid,
        amount_minor_units: req.payment_data.amount_minor_units.unwrap_or(0),
        currency: req
            .payment_data
            .currency
            .clone()
            .unwrap_or_else(|| "usd".to_string())
            .to_lowercase(),
        failure_reason,
        failure_code,
        received_at: queries::now(),
        client_reference: req.client_reference.clone(),
    };

    // The synthesized event doubles as the audited raw body; there is no
    // provider payload for simulated deliveries.
    let raw_body = match serde_json::to_string(&event) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to serialize simulated event: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    let event_id = event.event_id.clone();
    let payment_intent_id = event.payment_intent_id.clone();

    let result = tokio::task::spawn_blocking(move || {
        handle_event(&state, &event, VerificationOutcome::Simulated, &raw_body)
    })
    .await;

    match result {
        Ok((status, message)) => (
            status,
            Json(SimulateResponse {
                message,
                event_id,
                payment_intent_id,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Simulation worker panicked: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
