//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when the database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const CLIENT_COLS: &str = "id, reference, display_name";

pub const PROJECTION_COLS: &str =
    "payment_outcome, payment_amount_minor, payment_currency, payment_updated_at";

pub const JOURNEY_CONTEXT_COLS: &str =
    "client_id, content_version_id, page_type, hypothesis, started_at";

pub const CORRELATION_COLS: &str = "id, payment_intent_id, client_id, client_reference, outcome, journey_snapshot, conversion_duration_seconds, amount_minor_units, currency, failure_reason, failure_code, source_event_ids, needs_review, version, correlated_at, updated_at";

pub const AUDIT_ENTRY_COLS: &str = "id, received_at, verification_outcome, event_id, payment_intent_id, event_kind, client_reference, disposition, raw_body";

// ============ FromRow Implementations ============

impl FromRow for ClientSummary {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ClientSummary {
            id: row.get(0)?,
            reference: row.get(1)?,
            display_name: row.get(2)?,
        })
    }
}

impl FromRow for PaymentProjection {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentProjection {
            outcome: parse_enum(row, 0, "payment_outcome")?,
            amount_minor_units: row.get(1)?,
            currency: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

impl FromRow for JourneyContext {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(JourneyContext {
            client_id: row.get(0)?,
            content_version_id: row.get(1)?,
            page_type: row.get(2)?,
            hypothesis: row.get(3)?,
            started_at: row.get(4)?,
        })
    }
}

impl FromRow for CorrelationRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let snapshot_json: Option<String> = row.get(5)?;
        let journey_snapshot = match snapshot_json {
            Some(s) => Some(serde_json::from_str(&s).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    5,
                    "journey_snapshot".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?),
            None => None,
        };
        let source_ids_json: String = row.get(11)?;
        Ok(CorrelationRecord {
            id: row.get(0)?,
            payment_intent_id: row.get(1)?,
            client_id: row.get(2)?,
            client_reference: row.get(3)?,
            outcome: parse_enum(row, 4, "outcome")?,
            journey_snapshot,
            conversion_duration_seconds: row.get(6)?,
            amount_minor_units: row.get(7)?,
            currency: row.get(8)?,
            failure_reason: row.get(9)?,
            failure_code: row.get(10)?,
            source_event_ids: serde_json::from_str(&source_ids_json).unwrap_or_default(),
            needs_review: row.get::<_, i32>(12)? != 0,
            version: row.get(13)?,
            correlated_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl FromRow for AuditEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AuditEntry {
            id: row.get(0)?,
            received_at: row.get(1)?,
            verification_outcome: parse_enum(row, 2, "verification_outcome")?,
            event_id: row.get(3)?,
            payment_intent_id: row.get(4)?,
            event_kind: parse_enum(row, 5, "event_kind")?,
            client_reference: row.get(6)?,
            disposition: parse_enum(row, 7, "disposition")?,
            raw_body: row.get(8)?,
        })
    }
}
