//! Event Verifier: webhook authenticity check plus payload normalization.
//!
//! The provider signs each delivery with `t=<unix_ts>,v1=<hex hmac>` over
//! `"{t}.{body}"` using a shared secret. Verification recomputes the HMAC
//! and compares in constant time, then parses the body into one of the three
//! event kinds this engine handles.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::models::{EventKind, NormalizedPaymentEvent};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
/// The provider recommends 300 seconds (5 minutes).
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Clock-skew allowance for timestamps in the future (seconds).
const FUTURE_SKEW_SECS: i64 = 60;

#[derive(Clone)]
pub struct EventVerifier {
    webhook_secret: String,
}

impl EventVerifier {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Verify the delivery signature and normalize the payload.
    ///
    /// `received_at` is when this service accepted the delivery; it is
    /// stamped onto the normalized event and later drives the conversion
    /// duration metric.
    pub fn verify(
        &self,
        body: &[u8],
        signature_header: &str,
        received_at: i64,
    ) -> Result<NormalizedPaymentEvent> {
        if !self.check_signature(body, signature_header)? {
            return Err(AppError::InvalidSignature);
        }
        parse_event(body, received_at)
    }

    /// Recompute the expected signature and compare in constant time.
    /// Returns Ok(false) on mismatch or stale timestamp; Err only for a
    /// header that cannot be interpreted at all.
    fn check_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp.ok_or(AppError::InvalidSignature)?;
        let sig_v1 = sig_v1.ok_or(AppError::InvalidSignature)?;

        // Reject stale timestamps so captured deliveries can't be replayed
        // outside the tolerance window.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::InvalidSignature)?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        if age < -FUTURE_SKEW_SECS {
            tracing::warn!("Webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length check is not constant-time, but signature length is not
        // secret (always 64 hex chars for SHA-256).
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

// ============ Provider payload shapes ============

/// Generic provider event envelope - object is parsed based on event type.
#[derive(Debug, Deserialize)]
struct ProviderEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: ProviderEventData,
}

#[derive(Debug, Deserialize)]
struct ProviderEventData {
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderMetadata {
    client_reference: Option<String>,
}

// ============ payment_intent.succeeded / payment_intent.payment_failed ============

#[derive(Debug, Deserialize)]
struct ProviderPaymentIntent {
    id: String,
    amount: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: ProviderMetadata,
    last_payment_error: Option<ProviderPaymentError>,
}

#[derive(Debug, Deserialize)]
struct ProviderPaymentError {
    code: Option<String>,
    message: Option<String>,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
struct ProviderCheckoutSession {
    id: String,
    payment_status: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: ProviderMetadata,
}

/// Parse a raw delivery body into a normalized event.
///
/// Event types the provider is known to send but this engine does not handle
/// surface as `UnsupportedEventKind` (acknowledged and dropped); anything
/// that cannot be interpreted at all is `MalformedPayload`.
pub fn parse_event(body: &[u8], received_at: i64) -> Result<NormalizedPaymentEvent> {
    let event: ProviderEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::MalformedPayload(format!("Invalid event JSON: {}", e)))?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            parse_payment_intent(&event, EventKind::PaymentSucceeded, received_at)
        }
        "payment_intent.payment_failed" => {
            parse_payment_intent(&event, EventKind::PaymentFailed, received_at)
        }
        "checkout.session.completed" => parse_checkout_session(&event, received_at),
        other => Err(AppError::UnsupportedEventKind(other.to_string())),
    }
}

fn required_amount(amount: Option<i64>) -> Result<i64> {
    match amount {
        Some(a) if a >= 0 => Ok(a),
        Some(a) => Err(AppError::MalformedPayload(format!(
            "Negative amount: {}",
            a
        ))),
        None => Err(AppError::MalformedPayload("Missing amount".into())),
    }
}

fn required_client_reference(metadata: &ProviderMetadata) -> Result<String> {
    match metadata.client_reference.as_deref() {
        Some(r) if !r.trim().is_empty() => Ok(r.trim().to_string()),
        _ => Err(AppError::MalformedPayload(
            "Missing metadata.client_reference".into(),
        )),
    }
}

fn parse_payment_intent(
    event: &ProviderEvent,
    kind: EventKind,
    received_at: i64,
) -> Result<NormalizedPaymentEvent> {
    let intent: ProviderPaymentIntent = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::MalformedPayload(format!("Invalid payment intent: {}", e)))?;

    let (failure_reason, failure_code) = if kind == EventKind::PaymentFailed {
        intent
            .last_payment_error
            .map(|e| (e.message, e.code))
            .unwrap_or((None, None))
    } else {
        (None, None)
    };

    Ok(NormalizedPaymentEvent {
        event_id: event.id.clone(),
        payment_intent_id: intent.id,
        kind,
        checkout_paid: None,
        amount_minor_units: required_amount(intent.amount)?,
        currency: intent
            .currency
            .ok_or_else(|| AppError::MalformedPayload("Missing currency".into()))?
            .to_lowercase(),
        failure_reason,
        failure_code,
        received_at,
        client_reference: required_client_reference(&intent.metadata)?,
    })
}

fn parse_checkout_session(
    event: &ProviderEvent,
    received_at: i64,
) -> Result<NormalizedPaymentEvent> {
    let session: ProviderCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::MalformedPayload(format!("Invalid checkout session: {}", e)))?;

    let paid = session.payment_status == "paid";

    // payment_intent links the session to later intent events. Deferred
    // checkouts may not carry one yet; fall back to the session id so the
    // attempt still gets exactly one correlation record.
    let payment_intent_id = session.payment_intent.unwrap_or(session.id);

    Ok(NormalizedPaymentEvent {
        event_id: event.id.clone(),
        payment_intent_id,
        kind: EventKind::CheckoutCompleted,
        checkout_paid: Some(paid),
        amount_minor_units: required_amount(session.amount_total)?,
        currency: session
            .currency
            .ok_or_else(|| AppError::MalformedPayload("Missing currency".into()))?
            .to_lowercase(),
        failure_reason: None,
        failure_code: None,
        received_at,
        client_reference: required_client_reference(&session.metadata)?,
    })
}
