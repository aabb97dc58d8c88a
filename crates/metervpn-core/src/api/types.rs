//! Wire types for the MeterVPN server API.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::config::AddressFamily;
use crate::pricing::PriceTable;

use super::ApiError;

/// Server-issued account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an identifier, rejecting blank values.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into().trim().to_string();
        (!id.is_empty()).then_some(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response of `POST /peer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    pub account_id: AccountId,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

/// Response of `GET /peer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub ip: Option<PeerIp>,
    /// RFC 1123 timestamp, e.g. `Mon, 02 Jan 2006 15:04:05 UTC`.
    pub expiry_date: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PeerIp {
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v6: String,
}

/// A price that may arrive as a JSON number or a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawPrice")]
pub struct PriceValue(pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
}

impl TryFrom<RawPrice> for PriceValue {
    type Error = String;

    fn try_from(raw: RawPrice) -> Result<Self, Self::Error> {
        match raw {
            RawPrice::Number(n) => Ok(Self(n)),
            RawPrice::Text(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(|e| format!("invalid price {s:?}: {e}")),
        }
    }
}

/// Prices for one currency over the quoted periods.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodPrices {
    pub hour: PriceValue,
    #[serde(default)]
    pub day: Option<PriceValue>,
    #[serde(default)]
    pub month: Option<PriceValue>,
}

/// Response of `GET /price`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceSnapshot {
    pub satoshi: PeriodPrices,
    pub usd: PeriodPrices,
}

impl PriceSnapshot {
    /// Per-hour table used for quoting.
    pub fn table(&self) -> Result<PriceTable, ApiError> {
        let table = PriceTable {
            satoshi_per_hour: self.satoshi.hour.0,
            fiat_per_hour: self.usd.hour.0,
        };
        table
            .validate()
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        Ok(table)
    }
}

/// Body of `POST /peer/extend`. Duration is whole seconds as a string.
#[derive(Debug, Clone, Serialize)]
pub struct ExtendRequest {
    pub duration: String,
}

/// Body of `POST /peer/pubkey`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterKeyRequest {
    pub public_key: String,
}

/// Response of `GET /peer/ip`. Empty strings mean "not assigned".
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AssignedAddress {
    #[serde(default)]
    pub ipv4: String,
    #[serde(default)]
    pub ipv6: String,
}

impl AssignedAddress {
    /// Pick the preferred family, falling back to the other one.
    pub fn select(&self, preferred: AddressFamily) -> Option<IpAddr> {
        let v4 = self.ipv4.trim().parse::<IpAddr>().ok();
        let v6 = self.ipv6.trim().parse::<IpAddr>().ok();
        match preferred {
            AddressFamily::Ipv4 => v4.or(v6),
            AddressFamily::Ipv6 => v6.or(v4),
        }
    }
}

/// Outcome of an extension request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionResponse {
    /// Accepted without payment.
    Granted,
    /// HTTP 402; the body is the Lightning invoice to pay.
    PaymentRequired { invoice: String },
}

/// Response body of `GET /peer/extend/completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub result: String,
}

/// Settlement state of one invoice as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementStatus {
    Completed,
    /// Anything else the server reports, e.g. `"timeout"` after a long-poll.
    Pending(String),
    /// HTTP 404: the server has no pending extension for this invoice.
    UnknownInvoice,
}

impl From<CompletionResponse> for SettlementStatus {
    fn from(resp: CompletionResponse) -> Self {
        if resp.result == "completed" {
            Self::Completed
        } else {
            Self::Pending(resp.result)
        }
    }
}

/// Error body the server sends with 4xx/5xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
