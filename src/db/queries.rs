use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, AUDIT_ENTRY_COLS, CLIENT_COLS, CORRELATION_COLS, JOURNEY_CONTEXT_COLS,
    PROJECTION_COLS,
};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Whether a rusqlite error is a UNIQUE constraint violation.
/// Used to detect insert races on `correlations.payment_intent_id`.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============ Clients (reference repository implementation) ============

pub fn create_client(conn: &Connection, input: &CreateClient) -> Result<ClientSummary> {
    let id = EntityType::Client.gen_id();
    conn.execute(
        "INSERT INTO clients (id, reference, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, &input.reference, &input.display_name, now()],
    )?;
    Ok(ClientSummary {
        id,
        reference: input.reference.clone(),
        display_name: input.display_name.clone(),
    })
}

pub fn get_client_by_reference(conn: &Connection, reference: &str) -> Result<Option<ClientSummary>> {
    query_one(
        conn,
        &format!("SELECT {} FROM clients WHERE reference = ?1", CLIENT_COLS),
        &[&reference],
    )
}

/// Read the payment projection; None until the first correlation writes it.
pub fn get_client_payment_projection(
    conn: &Connection,
    client_id: &str,
) -> Result<Option<PaymentProjection>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM clients WHERE id = ?1 AND payment_outcome IS NOT NULL",
            PROJECTION_COLS
        ),
        &[&client_id],
    )
}

/// Write the narrow payment-status projection onto the client row.
/// Returns false when the client row does not exist.
pub fn update_client_payment_projection(
    conn: &Connection,
    client_id: &str,
    projection: &PaymentProjection,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE clients
         SET payment_outcome = ?1, payment_amount_minor = ?2, payment_currency = ?3, payment_updated_at = ?4
         WHERE id = ?5",
        params![
            projection.outcome.as_ref(),
            projection.amount_minor_units,
            &projection.currency,
            projection.updated_at,
            client_id
        ],
    )?;
    Ok(affected > 0)
}

// ============ Journeys (reference repository implementation) ============

pub fn create_journey(conn: &Connection, input: &CreateJourney) -> Result<String> {
    let id = EntityType::Journey.gen_id();
    conn.execute(
        "INSERT INTO journeys (id, client_id, content_version_id, page_type, hypothesis, started_at, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        params![
            &id,
            &input.client_id,
            &input.content_version_id,
            &input.page_type,
            &input.hypothesis,
            input.started_at
        ],
    )?;
    Ok(id)
}

/// The most recently started active journey for a client.
pub fn get_active_journey_context(
    conn: &Connection,
    client_id: &str,
) -> Result<Option<JourneyContext>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM journeys WHERE client_id = ?1 AND active = 1
             ORDER BY started_at DESC LIMIT 1",
            JOURNEY_CONTEXT_COLS
        ),
        &[&client_id],
    )
}

// ============ Correlations ============

pub fn get_correlation_by_intent(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Option<CorrelationRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM correlations WHERE payment_intent_id = ?1",
            CORRELATION_COLS
        ),
        &[&payment_intent_id],
    )
}

pub fn list_correlations_for_client(
    conn: &Connection,
    client_id: &str,
) -> Result<Vec<CorrelationRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM correlations WHERE client_id = ?1 ORDER BY correlated_at DESC",
            CORRELATION_COLS
        ),
        &[&client_id],
    )
}

pub fn insert_correlation(conn: &Connection, record: &CorrelationRecord) -> Result<()> {
    let snapshot_json = record
        .journey_snapshot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let source_ids_json = serde_json::to_string(&record.source_event_ids)?;

    conn.execute(
        "INSERT INTO correlations (id, payment_intent_id, client_id, client_reference, outcome,
             journey_snapshot, conversion_duration_seconds, amount_minor_units, currency,
             failure_reason, failure_code, source_event_ids, needs_review, version,
             correlated_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            &record.id,
            &record.payment_intent_id,
            &record.client_id,
            &record.client_reference,
            record.outcome.as_ref(),
            &snapshot_json,
            record.conversion_duration_seconds,
            record.amount_minor_units,
            &record.currency,
            &record.failure_reason,
            &record.failure_code,
            &source_ids_json,
            record.needs_review as i32,
            record.version,
            record.correlated_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

/// Compare-and-swap update of a correlation's mutable columns.
///
/// The journey snapshot is write-once and deliberately absent here. Returns
/// false when `expected_version` no longer matches (concurrent writer won);
/// the caller retries the whole read-modify-write.
pub fn update_correlation_cas(
    conn: &Connection,
    record: &CorrelationRecord,
    expected_version: i64,
) -> Result<bool> {
    let source_ids_json = serde_json::to_string(&record.source_event_ids)?;
    let affected = conn.execute(
        "UPDATE correlations
         SET outcome = ?1, conversion_duration_seconds = ?2, amount_minor_units = ?3,
             currency = ?4, failure_reason = ?5, failure_code = ?6, source_event_ids = ?7,
             version = version + 1, updated_at = ?8
         WHERE payment_intent_id = ?9 AND version = ?10",
        params![
            record.outcome.as_ref(),
            record.conversion_duration_seconds,
            record.amount_minor_units,
            &record.currency,
            &record.failure_reason,
            &record.failure_code,
            &source_ids_json,
            record.updated_at,
            &record.payment_intent_id,
            expected_version,
        ],
    )?;
    Ok(affected > 0)
}

// ============ Processed Events (idempotency store) ============

/// Whether this exact delivery was already handled. Read-only pre-check used
/// to short-circuit before journey resolution; the authoritative check is
/// `try_record_processed_event` inside the correlation transaction.
pub fn has_processed_event(conn: &Connection, event_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM processed_events WHERE event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Atomically record a delivery, returning true if this is a new event.
/// Returns false if the event was already processed (provider redelivery).
///
/// Uses INSERT OR IGNORE for atomicity - if the event_id already exists,
/// the insert is silently ignored and we return false.
pub fn try_record_processed_event(
    conn: &Connection,
    event_id: &str,
    payment_intent_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO processed_events (event_id, payment_intent_id, created_at)
         VALUES (?1, ?2, ?3)",
        params![event_id, payment_intent_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge processed-event ids beyond the retention period. These only exist
/// for duplicate detection and providers stop redelivering after a few days.
/// Returns the number of deleted records.
pub fn purge_old_processed_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM processed_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Audit Log ============

/// Append one audit entry. The audit store is append-only: there is no
/// update or delete path anywhere in this engine.
#[allow(clippy::too_many_arguments)]
pub fn append_audit_entry(
    conn: &Connection,
    received_at: i64,
    verification_outcome: VerificationOutcome,
    event_id: &str,
    payment_intent_id: &str,
    event_kind: EventKind,
    client_reference: &str,
    disposition: AuditDisposition,
    raw_body: &str,
) -> Result<AuditEntry> {
    let id = EntityType::AuditEntry.gen_id();
    conn.execute(
        "INSERT INTO audit_entries (id, received_at, verification_outcome, event_id,
             payment_intent_id, event_kind, client_reference, disposition, raw_body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            received_at,
            verification_outcome.as_ref(),
            event_id,
            payment_intent_id,
            event_kind.as_ref(),
            client_reference,
            disposition.as_ref(),
            raw_body,
        ],
    )?;
    Ok(AuditEntry {
        id,
        received_at,
        verification_outcome,
        event_id: event_id.to_string(),
        payment_intent_id: payment_intent_id.to_string(),
        event_kind,
        client_reference: client_reference.to_string(),
        disposition,
        raw_body: raw_body.to_string(),
    })
}

pub fn list_audit_entries_for_intent(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Vec<AuditEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_entries WHERE payment_intent_id = ?1 ORDER BY received_at",
            AUDIT_ENTRY_COLS
        ),
        &[&payment_intent_id],
    )
}

pub fn count_audit_entries(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))?;
    Ok(count)
}
