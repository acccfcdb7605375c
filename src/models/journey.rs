use serde::{Deserialize, Serialize};

/// The in-flight journey state for a client, as returned by the journey
/// repository at correlation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyContext {
    pub client_id: String,
    pub content_version_id: String,
    /// The page the client has reached in the activation sequence.
    pub page_type: String,
    pub hypothesis: Option<String>,
    pub started_at: i64,
}

/// Input for creating a journey row in the reference store (seed and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJourney {
    pub client_id: String,
    pub content_version_id: String,
    pub page_type: String,
    pub hypothesis: Option<String>,
    pub started_at: i64,
}
