//! Webhook ingestion endpoint.
//!
//! Response contract toward the payment provider: 200 means the delivery is
//! durably recorded (newly correlated, already seen, or unresolved-but-
//! audited) and retrying should stop; 400 means the delivery is unverifiable
//! and will never succeed; any 5xx asks the provider to redeliver.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};

use crate::correlate::{CorrelationOutcome, CorrelationWriter};
use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::models::{AuditDisposition, NormalizedPaymentEvent, VerificationOutcome};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(handle_payment_webhook))
}

pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match headers.get("payment-signature") {
        Some(value) => match value.to_str() {
            Ok(s) => s.to_string(),
            Err(e) => {
                tracing::debug!("Invalid UTF-8 in signature header: {}", e);
                return (StatusCode::BAD_REQUEST, "Invalid signature header");
            }
        },
        None => return (StatusCode::BAD_REQUEST, "Missing payment-signature header"),
    };

    let received_at = queries::now();
    let deadline = state.processing_deadline;

    let work =
        tokio::task::spawn_blocking(move || process_delivery(&state, &body, &signature, received_at));

    match tokio::time::timeout(deadline, work).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!("Webhook worker panicked: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        Err(_) => {
            // Never acknowledge a timed-out delivery: the provider's retry is
            // the only recovery path for the incomplete work, and a 200 here
            // would permanently lose the correlation.
            tracing::warn!("Processing deadline exceeded; asking provider to redeliver");
            (StatusCode::SERVICE_UNAVAILABLE, "Processing deadline exceeded")
        }
    }
}

fn process_delivery(
    state: &AppState,
    body: &Bytes,
    signature: &str,
    received_at: i64,
) -> WebhookResult {
    let event = match state.verifier.verify(body, signature, received_at) {
        Ok(event) => event,
        // Rejected deliveries never reach the audit log: no verified event
        // exists yet. The raw rejection is only visible in operator logs.
        Err(AppError::InvalidSignature) => {
            tracing::warn!("Rejected delivery: invalid signature");
            return (StatusCode::BAD_REQUEST, "Invalid signature");
        }
        Err(AppError::MalformedPayload(msg)) => {
            tracing::warn!("Rejected delivery: malformed payload: {}", msg);
            return (StatusCode::BAD_REQUEST, "Malformed payload");
        }
        Err(AppError::UnsupportedEventKind(kind)) => {
            tracing::debug!("Acknowledging unsupported event kind: {}", kind);
            return (StatusCode::OK, "Event ignored");
        }
        Err(e) => {
            tracing::error!("Verification error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Verification error");
        }
    };

    let raw_body = String::from_utf8_lossy(body).into_owned();
    handle_event(state, &event, VerificationOutcome::Verified, &raw_body)
}

/// Correlate a verified (or simulated) event and audit the delivery.
///
/// Shared by the ingestion endpoint and the dev simulation endpoint. Runs
/// blocking store I/O; callers invoke it from `spawn_blocking`.
pub(crate) fn handle_event(
    state: &AppState,
    event: &NormalizedPaymentEvent,
    verification: VerificationOutcome,
    raw_body: &str,
) -> WebhookResult {
    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable");
        }
    };

    // Short-circuit exact redeliveries before doing any journey resolution.
    // The authoritative claim happens again inside the correlation
    // transaction, so a race between two identical deliveries is still safe.
    let duplicate = match queries::has_processed_event(&conn, &event.event_id) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("Idempotency lookup failed: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable");
        }
    };

    let (disposition, response) = if duplicate {
        (
            AuditDisposition::Duplicate,
            (StatusCode::OK, "Already processed"),
        )
    } else {
        let writer = CorrelationWriter::new(state.clients.clone(), state.journeys.clone());
        match writer.process(&mut conn, event) {
            Ok(outcome) => {
                let response = match &outcome {
                    CorrelationOutcome::Duplicate => (StatusCode::OK, "Already processed"),
                    _ => (StatusCode::OK, "OK"),
                };
                (outcome.disposition(), response)
            }
            Err(e) => {
                tracing::error!(
                    "Correlation failed for intent {}: {}",
                    event.payment_intent_id,
                    e
                );
                let status = if e.is_retryable() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (AuditDisposition::Failed, (status, "Correlation failed"))
            }
        }
    };

    // Audit append happens for every verified delivery, duplicates and
    // failures included. If the append itself fails the delivery is not
    // durably recorded, so the provider must redeliver.
    let audit_conn = match state.audit.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Audit DB connection error: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "Audit store unavailable");
        }
    };

    if let Err(e) = queries::append_audit_entry(
        &audit_conn,
        event.received_at,
        verification,
        &event.event_id,
        &event.payment_intent_id,
        event.kind,
        &event.client_reference,
        disposition,
        raw_body,
    ) {
        tracing::error!("Audit append failed: {}", e);
        return (StatusCode::SERVICE_UNAVAILABLE, "Audit store unavailable");
    }

    response
}
