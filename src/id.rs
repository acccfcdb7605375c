//! Prefixed ID generation for paytrace entities.
//!
//! All IDs use a `pt_` brand prefix to guarantee collision avoidance with
//! payment provider IDs (`pi_`, `cs_`, `evt_`, etc.).
//!
//! Format: `pt_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["pt_cli_", "pt_jny_", "pt_cor_", "pt_aud_"];

/// Validate that a string is a valid paytrace prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `pt_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in paytrace.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Client,
    Journey,
    Correlation,
    AuditEntry,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Client => "pt_cli",
            Self::Journey => "pt_jny",
            Self::Correlation => "pt_cor",
            Self::AuditEntry => "pt_aud",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
