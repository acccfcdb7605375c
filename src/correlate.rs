//! Correlation Writer: the per-payment-intent state machine.
//!
//! Each normalized event is applied inside one database transaction that
//! covers the idempotency check, the correlation record write, and the
//! client payment projection - all three commit or roll back together, so a
//! provider redelivery after any failure is always safe.
//!
//! Outcome transitions: `NoRecord -> Pending -> {Paid, Failed}`. Paid is
//! terminal; Failed -> Paid is allowed (the payment succeeded on retry).
//! A Paid -> Failed attempt is ignored, since out-of-order delivery of a
//! stale failure event is expected behavior, not an error.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::{
    AuditDisposition, CorrelationRecord, JourneySnapshot, NormalizedPaymentEvent, OutcomeType,
    PaymentProjection,
};
use crate::repos::{ClientRepository, JourneyRepository};

/// Bounded internal retries for optimistic-concurrency conflicts before the
/// error escalates to a retryable HTTP status.
const MAX_CAS_ATTEMPTS: u32 = 3;
const CAS_BACKOFF_MS: u64 = 25;

/// What applying one event did to the correlation state.
#[derive(Debug)]
pub enum CorrelationOutcome {
    /// A new record was created for this payment intent.
    Created(CorrelationRecord),
    /// An existing record absorbed the event (outcome change or new event id).
    Updated(CorrelationRecord),
    /// Exact redelivery of an already-processed event id; nothing changed.
    Duplicate,
    /// The event asked for Paid -> Failed; outcome kept, event id recorded.
    TransitionIgnored(CorrelationRecord),
}

impl CorrelationOutcome {
    pub fn disposition(&self) -> AuditDisposition {
        match self {
            Self::Created(_) => AuditDisposition::Correlated,
            Self::Updated(_) => AuditDisposition::Updated,
            Self::Duplicate => AuditDisposition::Duplicate,
            Self::TransitionIgnored(_) => AuditDisposition::TransitionIgnored,
        }
    }
}

pub struct CorrelationWriter {
    clients: Arc<dyn ClientRepository>,
    journeys: Arc<dyn JourneyRepository>,
}

impl CorrelationWriter {
    pub fn new(clients: Arc<dyn ClientRepository>, journeys: Arc<dyn JourneyRepository>) -> Self {
        Self { clients, journeys }
    }

    /// Apply one event, retrying internally on concurrent-writer conflicts.
    pub fn process(
        &self,
        conn: &mut Connection,
        event: &NormalizedPaymentEvent,
    ) -> Result<CorrelationOutcome> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_process(conn, event) {
                Err(AppError::ConcurrentModification(msg)) if attempt + 1 < MAX_CAS_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(
                        "Concurrent modification on intent {} (attempt {}): {}",
                        event.payment_intent_id,
                        attempt,
                        msg
                    );
                    // Runs under spawn_blocking; a thread sleep does not
                    // stall the async runtime.
                    std::thread::sleep(Duration::from_millis(CAS_BACKOFF_MS * attempt as u64));
                }
                other => return other,
            }
        }
    }

    /// One attempt: idempotency claim, record lookup, transition, projection,
    /// commit. Any error drops the transaction and rolls everything back.
    fn try_process(
        &self,
        conn: &mut Connection,
        event: &NormalizedPaymentEvent,
    ) -> Result<CorrelationOutcome> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Atomically claim this delivery. A redelivered event id short-circuits
        // here; two different event ids for the same intent both pass and are
        // deduplicated at the record level below.
        if !queries::try_record_processed_event(&tx, &event.event_id, &event.payment_intent_id)? {
            // No commit needed - the claim insert was a no-op.
            return Ok(CorrelationOutcome::Duplicate);
        }

        let outcome = match queries::get_correlation_by_intent(&tx, &event.payment_intent_id)? {
            None => self.create_record(&tx, event)?,
            Some(existing) => self.apply_transition(&tx, event, existing)?,
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn create_record(
        &self,
        tx: &Connection,
        event: &NormalizedPaymentEvent,
    ) -> Result<CorrelationOutcome> {
        let now = queries::now();

        // Resolve the journey context that is live right now. The snapshot is
        // write-once: later events for this intent never re-resolve it.
        let (client_id, snapshot) =
            match self.clients.get_client_by_reference(tx, &event.client_reference)? {
                Some(client) => {
                    match self.journeys.get_active_journey_context(tx, &client.id)? {
                        Some(ctx) => (
                            Some(client.id),
                            Some(JourneySnapshot {
                                content_version_id: ctx.content_version_id,
                                page_type: ctx.page_type,
                                hypothesis: ctx.hypothesis,
                                started_at: ctx.started_at,
                            }),
                        ),
                        None => {
                            tracing::warn!(
                                "Client {} has no active journey; correlating intent {} without snapshot",
                                client.id,
                                event.payment_intent_id
                            );
                            (Some(client.id), None)
                        }
                    }
                }
                None => {
                    // Real money moved; the record is still created and
                    // flagged for manual review instead of dropping the event.
                    tracing::warn!(
                        "Client reference {:?} did not resolve; correlating intent {} for review",
                        event.client_reference,
                        event.payment_intent_id
                    );
                    (None, None)
                }
            };

        let outcome = event.outcome();
        let conversion_duration_seconds = match (&outcome, &snapshot) {
            (OutcomeType::Paid, Some(s)) => Some(event.received_at - s.started_at),
            _ => None,
        };

        let needs_review = snapshot.is_none();
        let record = CorrelationRecord {
            id: EntityType::Correlation.gen_id(),
            payment_intent_id: event.payment_intent_id.clone(),
            client_id,
            client_reference: event.client_reference.clone(),
            outcome,
            journey_snapshot: snapshot,
            conversion_duration_seconds,
            amount_minor_units: event.amount_minor_units,
            currency: event.currency.clone(),
            failure_reason: event.failure_reason.clone(),
            failure_code: event.failure_code.clone(),
            source_event_ids: vec![event.event_id.clone()],
            needs_review,
            version: 1,
            correlated_at: now,
            updated_at: now,
        };

        if let Err(e) = queries::insert_correlation(tx, &record) {
            // Another writer created the record between our lookup and this
            // insert; retry the whole read-modify-write.
            if let AppError::Database(ref db_err) = e {
                if queries::is_unique_violation(db_err) {
                    return Err(AppError::ConcurrentModification(format!(
                        "insert race on intent {}",
                        event.payment_intent_id
                    )));
                }
            }
            return Err(e);
        }

        if let Some(ref cid) = record.client_id {
            self.write_projection(tx, cid, &record, now)?;
        }

        tracing::info!(
            "Correlated intent {}: outcome={}, client={:?}, duration={:?}s",
            record.payment_intent_id,
            record.outcome.as_ref(),
            record.client_id,
            record.conversion_duration_seconds
        );

        Ok(CorrelationOutcome::Created(record))
    }

    fn apply_transition(
        &self,
        tx: &Connection,
        event: &NormalizedPaymentEvent,
        existing: CorrelationRecord,
    ) -> Result<CorrelationOutcome> {
        use OutcomeType::{Failed, Paid, Pending};

        let new_outcome = event.outcome();
        let expected_version = existing.version;
        let mut record = existing;
        let now = queries::now();

        // Set semantics: re-adding an already-present event id is a no-op.
        let newly_seen = !record.has_source_event(&event.event_id);
        if newly_seen {
            record.source_event_ids.push(event.event_id.clone());
        }

        let mut ignored = false;
        let mut outcome_changed = false;

        match (record.outcome, new_outcome) {
            (Paid, Failed) => {
                // Expected under out-of-order delivery: a stale failure
                // arriving after the terminal success. Keep Paid.
                tracing::warn!(
                    "Ignoring paid -> failed transition for intent {} (out-of-order delivery, event {})",
                    record.payment_intent_id,
                    event.event_id
                );
                ignored = true;
            }
            (Paid, _) => {
                // A second success or a late checkout event; nothing to change
                // beyond recording the event id.
            }
            (Failed, Paid) | (Pending, Paid) => {
                if record.outcome == Failed
                    && (record.amount_minor_units != event.amount_minor_units
                        || record.currency != event.currency)
                {
                    tracing::warn!(
                        "Intent {} promoted to paid with different amount: was {} {}, now {} {}",
                        record.payment_intent_id,
                        record.amount_minor_units,
                        record.currency,
                        event.amount_minor_units,
                        event.currency
                    );
                }
                record.outcome = Paid;
                record.amount_minor_units = event.amount_minor_units;
                record.currency = event.currency.clone();
                record.failure_reason = None;
                record.failure_code = None;
                record.conversion_duration_seconds = record
                    .journey_snapshot
                    .as_ref()
                    .map(|s| event.received_at - s.started_at);
                outcome_changed = true;
            }
            (Pending, Failed) => {
                record.outcome = Failed;
                record.amount_minor_units = event.amount_minor_units;
                record.currency = event.currency.clone();
                record.failure_reason = event.failure_reason.clone();
                record.failure_code = event.failure_code.clone();
                outcome_changed = true;
            }
            (Failed, Failed) => {
                // Keep the latest failure details from the retried attempt.
                if event.failure_reason.is_some() || event.failure_code.is_some() {
                    record.failure_reason = event.failure_reason.clone();
                    record.failure_code = event.failure_code.clone();
                }
            }
            (Failed, Pending) | (Pending, Pending) => {
                // A checkout event never downgrades an existing outcome.
            }
        }

        if newly_seen || outcome_changed {
            record.updated_at = now;
            if !queries::update_correlation_cas(tx, &record, expected_version)? {
                return Err(AppError::ConcurrentModification(format!(
                    "version moved for intent {}",
                    record.payment_intent_id
                )));
            }
            record.version = expected_version + 1;
        }

        if outcome_changed {
            if let Some(cid) = record.client_id.clone() {
                self.write_projection(tx, &cid, &record, now)?;
            }
            tracing::info!(
                "Updated intent {}: outcome={}, duration={:?}s",
                record.payment_intent_id,
                record.outcome.as_ref(),
                record.conversion_duration_seconds
            );
        }

        if ignored {
            Ok(CorrelationOutcome::TransitionIgnored(record))
        } else {
            Ok(CorrelationOutcome::Updated(record))
        }
    }

    fn write_projection(
        &self,
        tx: &Connection,
        client_id: &str,
        record: &CorrelationRecord,
        now: i64,
    ) -> Result<()> {
        let projection = PaymentProjection {
            outcome: record.outcome,
            amount_minor_units: record.amount_minor_units,
            currency: record.currency.clone(),
            updated_at: now,
        };
        self.clients.update_payment_projection(tx, client_id, &projection)
    }
}
