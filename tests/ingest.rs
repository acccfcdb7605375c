//! End-to-end ingestion tests: signed HTTP deliveries through the router,
//! asserting on correlation state, audit growth, and the retry contract.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use common::*;

fn webhook_request(body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header("payment-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response should be JSON")
}

fn seed_client_with_journey(state: &AppState, reference: &str, journey_start: i64) -> String {
    let conn = state.db.get().unwrap();
    let client = create_test_client(&conn, reference);
    create_test_journey(&conn, &client.id, journey_start);
    client.id
}

fn audit_count(state: &AppState) -> i64 {
    let conn = state.audit.get().unwrap();
    queries::count_audit_entries(&conn).unwrap()
}

#[tokio::test]
async fn test_signed_delivery_creates_correlation() {
    let state = create_test_app_state();
    let client_id = seed_client_with_journey(&state, "client_abc", now() - 90);
    let app = app(state.clone());

    let body = provider_succeeded_body("evt_1", "pi_1", "client_abc", 50000);
    let response = app
        .clone()
        .oneshot(webhook_request(&body, &sign(body.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Queryable through the read surface
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/correlations/intent/pi_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = response_json(response).await;
    assert_eq!(record["outcome"], "paid");
    assert_eq!(record["amount_minor_units"], 50000);
    assert_eq!(record["client_id"], client_id.as_str());

    assert_eq!(audit_count(&state), 1);
}

/// Redelivering the identical body and signature acknowledges both times,
/// keeps one correlation record, and audits each delivery.
#[tokio::test]
async fn test_redelivery_is_acknowledged_once_recorded() {
    let state = create_test_app_state();
    seed_client_with_journey(&state, "client_abc", now() - 90);
    let app = app(state.clone());

    let body = provider_succeeded_body("evt_1", "pi_1", "client_abc", 50000);
    let signature = sign(body.as_bytes());

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(webhook_request(&body, &signature))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    {
        let conn = state.db.get().unwrap();
        let record = queries::get_correlation_by_intent(&conn, "pi_1")
            .unwrap()
            .expect("One record should exist");
        assert_eq!(record.source_event_ids.len(), 1);
    }

    // One audit entry per received delivery
    assert_eq!(audit_count(&state), 2);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected_without_audit() {
    let state = create_test_app_state();
    seed_client_with_journey(&state, "client_abc", now() - 90);
    let app = app(state.clone());

    let body = provider_succeeded_body("evt_1", "pi_1", "client_abc", 50000);
    let timestamp = now().to_string();
    let bad_signature = format!(
        "t={},v1={}",
        timestamp,
        compute_signature(body.as_bytes(), "wrong_secret", &timestamp)
    );

    let response = app
        .clone()
        .oneshot(webhook_request(&body, &bad_signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No verified event exists, so nothing reaches the audit log
    assert_eq!(audit_count(&state), 0);
    let conn = state.db.get().unwrap();
    assert!(queries::get_correlation_by_intent(&conn, "pi_1")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_signature_header_is_rejected() {
    let state = create_test_app_state();
    let app = app(state);

    let body = provider_succeeded_body("evt_1", "pi_1", "client_abc", 50000);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payments")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Unsupported-but-valid events are acknowledged so the provider stops
/// retrying, and leave no trace in the stores.
#[tokio::test]
async fn test_unsupported_event_kind_is_acknowledged_and_dropped() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let body = serde_json::json!({
        "id": "evt_sub",
        "type": "customer.subscription.updated",
        "data": { "object": { "id": "sub_1" } }
    })
    .to_string();

    let response = app
        .oneshot(webhook_request(&body, &sign(body.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(audit_count(&state), 0);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() {
    let state = create_test_app_state();
    let app = app(state.clone());

    // Valid signature over a payload without a client reference
    let body = serde_json::json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_1", "amount": 100, "currency": "usd", "metadata": {} } }
    })
    .to_string();

    let response = app
        .oneshot(webhook_request(&body, &sign(body.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(audit_count(&state), 0);
}

/// Failed-then-succeeded over HTTP: one record, promoted to Paid, with both
/// delivery ids recorded and three audit entries for three deliveries.
#[tokio::test]
async fn test_retried_payment_promotes_over_http() {
    let state = create_test_app_state();
    seed_client_with_journey(&state, "client_abc", now() - 120);
    let app = app(state.clone());

    let failed = provider_failed_body("evt_1", "pi_2", "client_abc", 50000, "insufficient_funds");
    let response = app
        .clone()
        .oneshot(webhook_request(&failed, &sign(failed.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let succeeded = provider_succeeded_body("evt_2", "pi_2", "client_abc", 50000);
    let response = app
        .clone()
        .oneshot(webhook_request(&succeeded, &sign(succeeded.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A stale failure redelivered after the success changes nothing
    let response = app
        .clone()
        .oneshot(webhook_request(&failed, &sign(failed.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    {
        let conn = state.db.get().unwrap();
        let record = queries::get_correlation_by_intent(&conn, "pi_2")
            .unwrap()
            .unwrap();
        assert_eq!(record.outcome, OutcomeType::Paid);
        assert_eq!(
            record.source_event_ids,
            vec!["evt_1".to_string(), "evt_2".to_string()]
        );
    }

    assert_eq!(audit_count(&state), 3);
}

/// An unresolvable client reference is still acknowledged, audited, and
/// correlated for manual review.
#[tokio::test]
async fn test_unresolved_client_is_audited_and_acknowledged() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let body = provider_succeeded_body("evt_1", "pi_3", "client_stale", 50000);
    let response = app
        .oneshot(webhook_request(&body, &sign(body.as_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.db.get().unwrap();
    let record = queries::get_correlation_by_intent(&conn, "pi_3")
        .unwrap()
        .expect("Record should exist despite unresolved reference");
    assert!(record.client_id.is_none());
    assert!(record.journey_snapshot.is_none());
    assert!(record.needs_review);
    drop(conn);

    assert_eq!(audit_count(&state), 1);
}

#[tokio::test]
async fn test_simulation_endpoint_bypasses_signature() {
    let state = create_test_app_state();
    let client_id = seed_client_with_journey(&state, "client_demo", now() - 45);
    let app = app(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/dev/simulate")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "action": "succeed",
                "client_reference": "client_demo",
                "payment_data": {
                    "payment_intent_id": "pi_sim_1",
                    "amount_minor_units": 2500
                }
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["payment_intent_id"], "pi_sim_1");

    let conn = state.db.get().unwrap();
    let record = queries::get_correlation_by_intent(&conn, "pi_sim_1")
        .unwrap()
        .unwrap();
    assert_eq!(record.outcome, OutcomeType::Paid);
    assert_eq!(record.client_id.as_deref(), Some(client_id.as_str()));
    drop(conn);

    // Simulated deliveries are audited and marked as such
    let audit_conn = state.audit.get().unwrap();
    let entries = queries::list_audit_entries_for_intent(&audit_conn, "pi_sim_1").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].verification_outcome,
        VerificationOutcome::Simulated
    );
}

#[tokio::test]
async fn test_unknown_simulation_action_is_rejected() {
    let state = create_test_app_state();
    let app = app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/dev/simulate")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "action": "explode",
                "client_reference": "client_demo"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_correlation_queries() {
    let state = create_test_app_state();
    let client_id = seed_client_with_journey(&state, "client_abc", now() - 60);
    let app = app(state.clone());

    for (evt, pi) in [("evt_1", "pi_a"), ("evt_2", "pi_b")] {
        let body = provider_succeeded_body(evt, pi, "client_abc", 1000);
        let response = app
            .clone()
            .oneshot(webhook_request(&body, &sign(body.as_bytes())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/correlations/client/{}", client_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let records = response_json(response).await;
    assert_eq!(records.as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/correlations/intent/pi_missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = create_test_app_state();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
}
