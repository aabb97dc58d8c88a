//! MeterVPN server API.
//!
//! [`MeterApi`] is the seam between the client flows and the transport;
//! [`MeterClient`] implements it over HTTP with reqwest.

mod client;
pub mod types;


use std::future::Future;
use std::time::Duration;

pub use client::{ApiError, MeterClient};
pub use types::{
    AccountId, AssignedAddress, CreatedAccount, ExtensionResponse, PeerInfo, PriceSnapshot,
    SettlementStatus,
};

/// Operations the client needs from the metering server.
///
/// Every account-scoped call is made on behalf of exactly one account, fixed
/// when the implementation is constructed.
pub trait MeterApi: Send + Sync {
    /// `POST /peer`: issue a new account.
    fn create_account(&self) -> impl Future<Output = Result<CreatedAccount, ApiError>> + Send;

    /// `GET /peer`: current lease of the account.
    fn peer(&self) -> impl Future<Output = Result<PeerInfo, ApiError>> + Send;

    /// `GET /price`: current price table.
    fn price(&self) -> impl Future<Output = Result<PriceSnapshot, ApiError>> + Send;

    /// `POST /peer/pubkey`: register the tunnel public key (base64).
    fn register_public_key(
        &self,
        public_key: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `GET /peer/ip`: tunnel address assigned to the registered key.
    fn assigned_address(&self) -> impl Future<Output = Result<AssignedAddress, ApiError>> + Send;

    /// `POST /peer/extend`: ask for more lease time.
    fn request_extension(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<ExtensionResponse, ApiError>> + Send;

    /// `GET /peer/extend/completed`: has `invoice` been settled?
    fn settlement_status(
        &self,
        invoice: &str,
    ) -> impl Future<Output = Result<SettlementStatus, ApiError>> + Send;
}
