//! Collaborator repositories consumed by the correlation engine.
//!
//! The client and journey stores are owned by external services. The engine
//! talks to them through these traits so production adapters and test fakes
//! can be substituted without touching the correlation logic. Methods take a
//! `&Connection` so the SQLite reference implementations participate in the
//! caller's transaction - the correlation record and the client projection
//! must commit or roll back together.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ClientSummary, JourneyContext, PaymentProjection};

/// Read access to client identity plus the narrow payment-projection write.
pub trait ClientRepository: Send + Sync {
    /// Resolve the business reference embedded in event metadata.
    fn get_client_by_reference(
        &self,
        conn: &Connection,
        reference: &str,
    ) -> Result<Option<ClientSummary>>;

    /// Write the payment-status projection onto the client entity. Must be
    /// atomic with the caller's correlation write (same transaction).
    fn update_payment_projection(
        &self,
        conn: &Connection,
        client_id: &str,
        projection: &PaymentProjection,
    ) -> Result<()>;
}

/// Read access to the in-flight journey state for a client.
pub trait JourneyRepository: Send + Sync {
    fn get_active_journey_context(
        &self,
        conn: &Connection,
        client_id: &str,
    ) -> Result<Option<JourneyContext>>;
}

/// Reference implementation over the local `clients` table.
#[derive(Debug, Clone, Default)]
pub struct SqliteClientRepository;

impl ClientRepository for SqliteClientRepository {
    fn get_client_by_reference(
        &self,
        conn: &Connection,
        reference: &str,
    ) -> Result<Option<ClientSummary>> {
        queries::get_client_by_reference(conn, reference)
    }

    fn update_payment_projection(
        &self,
        conn: &Connection,
        client_id: &str,
        projection: &PaymentProjection,
    ) -> Result<()> {
        if !queries::update_client_payment_projection(conn, client_id, projection)? {
            return Err(crate::error::AppError::ProjectionWrite(format!(
                "client not found: {}",
                client_id
            )));
        }
        Ok(())
    }
}

/// Reference implementation over the local `journeys` table.
#[derive(Debug, Clone, Default)]
pub struct SqliteJourneyRepository;

impl JourneyRepository for SqliteJourneyRepository {
    fn get_active_journey_context(
        &self,
        conn: &Connection,
        client_id: &str,
    ) -> Result<Option<JourneyContext>> {
        queries::get_active_journey_context(conn, client_id)
    }
}
