//! Test utilities and fixtures for paytrace integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;

pub use paytrace::correlate::{CorrelationOutcome, CorrelationWriter};
pub use paytrace::db::{init_audit_db, init_db, queries, AppState};
pub use paytrace::error::AppError;
pub use paytrace::models::*;
pub use paytrace::repos::{ClientRepository, JourneyRepository, SqliteClientRepository, SqliteJourneyRepository};
pub use paytrace::verify::EventVerifier;

/// Shared secret used across signature tests
pub const TEST_SECRET: &str = "whsec_test_secret";

pub fn test_verifier() -> EventVerifier {
    EventVerifier::new(TEST_SECRET)
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an in-memory test audit database with schema initialized
pub fn setup_test_audit_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory audit database");
    init_audit_db(&conn).expect("Failed to initialize audit schema");
    conn
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Create a test client with the given business reference
pub fn create_test_client(conn: &Connection, reference: &str) -> ClientSummary {
    queries::create_client(
        conn,
        &CreateClient {
            reference: reference.to_string(),
            display_name: Some(format!("Test Client {}", reference)),
        },
    )
    .expect("Failed to create test client")
}

/// Create an active test journey for a client, started at the given time
pub fn create_test_journey(conn: &Connection, client_id: &str, started_at: i64) -> String {
    queries::create_journey(
        conn,
        &CreateJourney {
            client_id: client_id.to_string(),
            content_version_id: "cv_test_1".to_string(),
            page_type: "agreement".to_string(),
            hypothesis: Some("test hypothesis".to_string()),
            started_at,
        },
    )
    .expect("Failed to create test journey")
}

/// Correlation writer wired to the SQLite reference repositories
pub fn test_writer() -> CorrelationWriter {
    CorrelationWriter::new(
        Arc::new(SqliteClientRepository),
        Arc::new(SqliteJourneyRepository),
    )
}

// ============ Normalized event builders ============

pub fn succeeded_event(
    event_id: &str,
    payment_intent_id: &str,
    client_reference: &str,
    amount: i64,
) -> NormalizedPaymentEvent {
    NormalizedPaymentEvent {
        event_id: event_id.to_string(),
        payment_intent_id: payment_intent_id.to_string(),
        kind: EventKind::PaymentSucceeded,
        checkout_paid: None,
        amount_minor_units: amount,
        currency: "usd".to_string(),
        failure_reason: None,
        failure_code: None,
        received_at: now(),
        client_reference: client_reference.to_string(),
    }
}

pub fn failed_event(
    event_id: &str,
    payment_intent_id: &str,
    client_reference: &str,
    amount: i64,
    reason: &str,
) -> NormalizedPaymentEvent {
    NormalizedPaymentEvent {
        event_id: event_id.to_string(),
        payment_intent_id: payment_intent_id.to_string(),
        kind: EventKind::PaymentFailed,
        checkout_paid: None,
        amount_minor_units: amount,
        currency: "usd".to_string(),
        failure_reason: Some(reason.to_string()),
        failure_code: Some("card_declined".to_string()),
        received_at: now(),
        client_reference: client_reference.to_string(),
    }
}

pub fn checkout_event(
    event_id: &str,
    payment_intent_id: &str,
    client_reference: &str,
    amount: i64,
    paid: bool,
) -> NormalizedPaymentEvent {
    NormalizedPaymentEvent {
        event_id: event_id.to_string(),
        payment_intent_id: payment_intent_id.to_string(),
        kind: EventKind::CheckoutCompleted,
        checkout_paid: Some(paid),
        amount_minor_units: amount,
        currency: "usd".to_string(),
        failure_reason: None,
        failure_code: None,
        received_at: now(),
        client_reference: client_reference.to_string(),
    }
}

// ============ Provider payload + signature helpers ============

pub fn compute_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build a complete `payment-signature` header value for a payload
pub fn sign(payload: &[u8]) -> String {
    let timestamp = now().to_string();
    let signature = compute_signature(payload, TEST_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

pub fn provider_succeeded_body(
    event_id: &str,
    payment_intent_id: &str,
    client_reference: &str,
    amount: i64,
) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": payment_intent_id,
                "amount": amount,
                "currency": "usd",
                "metadata": { "client_reference": client_reference }
            }
        }
    })
    .to_string()
}

pub fn provider_failed_body(
    event_id: &str,
    payment_intent_id: &str,
    client_reference: &str,
    amount: i64,
    reason: &str,
) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.payment_failed",
        "data": {
            "object": {
                "id": payment_intent_id,
                "amount": amount,
                "currency": "usd",
                "metadata": { "client_reference": client_reference },
                "last_payment_error": { "code": "card_declined", "message": reason }
            }
        }
    })
    .to_string()
}

pub fn provider_checkout_body(
    event_id: &str,
    payment_intent_id: &str,
    client_reference: &str,
    amount: i64,
    payment_status: &str,
) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "payment_intent": payment_intent_id,
                "payment_status": payment_status,
                "amount_total": amount,
                "currency": "usd",
                "metadata": { "client_reference": client_reference }
            }
        }
    })
    .to_string()
}

// ============ HTTP fixtures ============

/// Create an AppState for testing with in-memory databases.
/// Pools are capped at one connection so every checkout sees the same
/// in-memory database.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let audit_manager = SqliteConnectionManager::memory();
    let audit_pool = Pool::builder().max_size(1).build(audit_manager).unwrap();
    {
        let conn = audit_pool.get().unwrap();
        init_audit_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        audit: audit_pool,
        verifier: test_verifier(),
        clients: Arc::new(SqliteClientRepository),
        journeys: Arc::new(SqliteJourneyRepository),
        processing_deadline: Duration::from_secs(5),
    }
}

/// Create a Router with all endpoints, dev simulation included
pub fn app(state: AppState) -> Router {
    use axum::routing::post;

    Router::new()
        .merge(paytrace::handlers::router())
        .route(
            "/dev/simulate",
            post(paytrace::handlers::dev::simulate_payment_event),
        )
        .with_state(state)
}

// ============ Failure-injection repositories ============

/// Client repository whose projection write always fails. Reads delegate to
/// the SQLite reference implementation so correlation gets as far as the
/// projection step before blowing up.
pub struct FailingProjectionRepository;

impl ClientRepository for FailingProjectionRepository {
    fn get_client_by_reference(
        &self,
        conn: &Connection,
        reference: &str,
    ) -> paytrace::error::Result<Option<ClientSummary>> {
        queries::get_client_by_reference(conn, reference)
    }

    fn update_payment_projection(
        &self,
        _conn: &Connection,
        _client_id: &str,
        _projection: &PaymentProjection,
    ) -> paytrace::error::Result<()> {
        Err(AppError::ProjectionWrite("injected failure".into()))
    }
}
