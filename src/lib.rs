//! paytrace - payment-outcome correlation engine
//!
//! Receives asynchronous payment-provider webhook events, verifies and
//! deduplicates them, and atomically correlates each payment attempt to the
//! client journey that was live when the payment started - exactly once per
//! logical event, even under retries, out-of-order delivery, or concurrent
//! duplicate webhooks.

pub mod config;
pub mod correlate;
pub mod db;
pub mod error;
pub mod handlers;
pub mod id;
pub mod models;
pub mod repos;
pub mod verify;
