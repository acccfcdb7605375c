use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,
    pub dev_mode: bool,
    /// Total processing budget per delivery; on timeout the handler answers
    /// with a retryable status so the provider redelivers.
    pub processing_deadline: Duration,
    /// Days to keep processed-event ids for duplicate detection.
    /// Providers stop redelivering after a few days. 0 = keep forever.
    pub event_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PAYTRACE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let deadline_secs: u64 = env::var("PAYTRACE_PROCESSING_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "paytrace.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "paytrace_audit.db".to_string()),
            webhook_secret: env::var("PAYTRACE_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_dev_secret".to_string()),
            dev_mode,
            processing_deadline: Duration::from_secs(deadline_secs),
            event_retention_days: env::var("PAYTRACE_EVENT_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
