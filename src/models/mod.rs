mod audit_entry;
mod client;
mod correlation;
mod event;
mod journey;

pub use audit_entry::{AuditDisposition, AuditEntry, VerificationOutcome};
pub use client::{ClientSummary, CreateClient, PaymentProjection};
pub use correlation::{CorrelationRecord, JourneySnapshot, OutcomeType};
pub use event::{EventKind, NormalizedPaymentEvent};
pub use journey::{CreateJourney, JourneyContext};
