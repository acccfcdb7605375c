mod schema;
pub mod from_row;
pub mod queries;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::repos::{ClientRepository, JourneyRepository};
use crate::verify::EventVerifier;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools and injected collaborators.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (clients, journeys, correlations, processed events)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    pub verifier: EventVerifier,
    pub clients: Arc<dyn ClientRepository>,
    pub journeys: Arc<dyn JourneyRepository>,
    /// Per-delivery processing budget enforced by the webhook handler.
    pub processing_deadline: Duration,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
