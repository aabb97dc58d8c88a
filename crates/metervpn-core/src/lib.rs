//! `MeterVPN` Core Library
//!
//! Client side of the `MeterVPN` pay-per-hour protocol:
//! - Pricing of requested durations against the server's price table
//! - Lightning invoice amount decoding
//! - Lease tracking with a stale-but-available countdown
//! - The extension state machine (request, pay, poll, settle)
//! - Tunnel provisioning (key registration, address, config bundle)
//! - Configuration resolution, tracing setup and shared error types

pub mod api;
pub mod config;
pub mod error;
pub mod extension;
pub mod format;
pub mod invoice;
pub mod lease;
pub mod poll;
pub mod pricing;
pub mod provision;
pub mod tracing_init;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod testing;


pub use api::{ApiError, MeterApi, MeterClient};
pub use config::Config;
pub use error::{Error, Result};
pub use extension::{ExtensionError, ExtensionOrchestrator, ExtensionOutcome, PaymentObligation};
pub use lease::{LeaseError, LeaseTracker, RemainingTime, SessionLease};
pub use pricing::{PriceSheet, PricingEngine, QuoteState};
pub use provision::{ProvisionError, TunnelBundle, TunnelProvisioner};
