use rusqlite::Connection;

/// Initialize the main database schema (everything except the audit log)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Clients (identity owned by the client service; this engine only
        -- writes the payment_* projection columns)
        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            reference TEXT NOT NULL UNIQUE,
            display_name TEXT,
            payment_outcome TEXT CHECK (payment_outcome IS NULL OR payment_outcome IN ('paid', 'failed', 'pending')),
            payment_amount_minor INTEGER,
            payment_currency TEXT,
            payment_updated_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_clients_reference ON clients(reference);

        -- Journeys (activation flows; at most one active per client)
        CREATE TABLE IF NOT EXISTS journeys (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
            content_version_id TEXT NOT NULL,
            page_type TEXT NOT NULL,
            hypothesis TEXT,
            started_at INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_journeys_client_active ON journeys(client_id, started_at DESC) WHERE active = 1;

        -- Correlations (one per payment intent)
        -- journey_snapshot: JSON, write-once at creation, NULL when the
        -- client reference or journey could not be resolved.
        -- version: optimistic-concurrency counter for compare-and-swap updates.
        CREATE TABLE IF NOT EXISTS correlations (
            id TEXT PRIMARY KEY,
            payment_intent_id TEXT NOT NULL UNIQUE,
            client_id TEXT REFERENCES clients(id) ON DELETE SET NULL,
            client_reference TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('paid', 'failed', 'pending')),
            journey_snapshot TEXT,
            conversion_duration_seconds INTEGER,
            amount_minor_units INTEGER NOT NULL,
            currency TEXT NOT NULL,
            failure_reason TEXT,
            failure_code TEXT,
            source_event_ids TEXT NOT NULL DEFAULT '[]',
            needs_review INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            correlated_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_correlations_client ON correlations(client_id, correlated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_correlations_review ON correlations(needs_review) WHERE needs_review = 1;

        -- Processed events (idempotency store; short-circuits exact redeliveries)
        CREATE TABLE IF NOT EXISTS processed_events (
            event_id TEXT PRIMARY KEY,
            payment_intent_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_processed_events_intent ON processed_events(payment_intent_id);
        "#,
    )?;
    Ok(())
}

/// Initialize the audit log database schema (separate DB file)
/// Optimized for append-only workload with WAL mode
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: writes are sequential appends, much faster for append-only workloads
    // synchronous=NORMAL: safe with WAL, faster than FULL
    // journal_size_limit: prevent WAL from growing indefinitely
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        CREATE TABLE IF NOT EXISTS audit_entries (
            id TEXT PRIMARY KEY,
            received_at INTEGER NOT NULL,
            verification_outcome TEXT NOT NULL CHECK (verification_outcome IN ('verified', 'simulated')),
            event_id TEXT NOT NULL,
            payment_intent_id TEXT NOT NULL,
            event_kind TEXT NOT NULL,
            client_reference TEXT NOT NULL,
            disposition TEXT NOT NULL,
            raw_body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_entries_received ON audit_entries(received_at);
        CREATE INDEX IF NOT EXISTS idx_audit_entries_intent ON audit_entries(payment_intent_id);
        CREATE INDEX IF NOT EXISTS idx_audit_entries_event ON audit_entries(event_id);
        "#,
    )?;
    Ok(())
}
