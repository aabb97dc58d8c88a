//! `MeterVPN` CLI Library
//!
//! Command implementations for the `metervpn` binary: account handling,
//! price quotes, lease status, paid extensions and tunnel configs.

pub mod account_cmd;
pub mod config;
pub mod connection;
pub mod extend_cmd;
pub mod output;
pub mod price_cmd;
pub mod status_cmd;
pub mod tunnel_cmd;
