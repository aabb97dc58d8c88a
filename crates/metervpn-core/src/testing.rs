//! In-memory `MeterApi` used by the unit and scenario tests.
//!
//! Every call yields once before answering so observers get to run, as they
//! would while a real request is in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::api::types::{PeerIp, PeriodPrices, PriceValue};
use crate::api::{
    AccountId, ApiError, AssignedAddress, CreatedAccount, ExtensionResponse, MeterApi, PeerInfo,
    PriceSnapshot, SettlementStatus,
};

/// What the fake answers to one settlement check.
#[derive(Debug, Clone)]
pub enum Settle {
    Completed,
    Pending,
    Unknown,
    Fail,
}

/// Number of calls made to each endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub create: u32,
    pub peer: u32,
    pub price: u32,
    pub register: u32,
    pub address: u32,
    pub extend: u32,
    pub settlement: u32,
}

#[derive(Debug)]
struct FakeState {
    expiry: DateTime<Utc>,
    prices: (f64, f64),
    fail_prices: bool,
    fail_peer: bool,
    grant_without_payment: bool,
    reject_extension: Option<String>,
    invoices: VecDeque<String>,
    issued: u32,
    settlements: HashMap<String, VecDeque<Settle>>,
    pending: HashMap<String, Duration>,
    address: AssignedAddress,
    fail_address: bool,
    fail_register: bool,
    settlement_latency: Duration,
    peer_latencies: VecDeque<Duration>,
    registered: Vec<String>,
    calls: Calls,
}

/// Scriptable in-memory metering server.
#[derive(Debug)]
pub struct FakeMeter {
    state: Mutex<FakeState>,
}

pub fn start_expiry() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

impl FakeMeter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                expiry: start_expiry(),
                prices: (54.6, 0.005_464),
                fail_prices: false,
                fail_peer: false,
                grant_without_payment: false,
                reject_extension: None,
                invoices: VecDeque::new(),
                issued: 0,
                settlements: HashMap::new(),
                pending: HashMap::new(),
                address: AssignedAddress {
                    ipv4: "10.8.0.2".into(),
                    ipv6: "fd00::2".into(),
                },
                fail_address: false,
                fail_register: false,
                settlement_latency: Duration::ZERO,
                peer_latencies: VecDeque::new(),
                registered: Vec::new(),
                calls: Calls::default(),
            }),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Calls {
        self.with(|s| s.calls)
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.with(|s| s.expiry)
    }

    pub fn set_expiry(&self, expiry: DateTime<Utc>) {
        self.with(|s| s.expiry = expiry);
    }

    pub fn set_prices(&self, satoshi_per_hour: f64, usd_per_hour: f64) {
        self.with(|s| s.prices = (satoshi_per_hour, usd_per_hour));
    }

    pub fn fail_prices(&self, fail: bool) {
        self.with(|s| s.fail_prices = fail);
    }

    pub fn fail_peer(&self, fail: bool) {
        self.with(|s| s.fail_peer = fail);
    }

    pub fn grant_without_payment(&self, grant: bool) {
        self.with(|s| s.grant_without_payment = grant);
    }

    pub fn reject_extensions(&self, message: &str) {
        self.with(|s| s.reject_extension = Some(message.to_string()));
    }

    /// Next invoice handed out on a 402.
    pub fn queue_invoice(&self, invoice: &str) {
        self.with(|s| s.invoices.push_back(invoice.to_string()));
    }

    /// Answers for successive settlement checks of `invoice`; once the
    /// script runs out the invoice stays pending.
    pub fn script_settlement(&self, invoice: &str, steps: impl IntoIterator<Item = Settle>) {
        self.with(|s| {
            s.settlements
                .entry(invoice.to_string())
                .or_default()
                .extend(steps);
        });
    }

    pub fn set_address(&self, ipv4: &str, ipv6: &str) {
        self.with(|s| {
            s.address = AssignedAddress {
                ipv4: ipv4.into(),
                ipv6: ipv6.into(),
            };
        });
    }

    pub fn fail_address(&self, fail: bool) {
        self.with(|s| s.fail_address = fail);
    }

    pub fn fail_register(&self, fail: bool) {
        self.with(|s| s.fail_register = fail);
    }

    /// How long each settlement check takes, like the server's long-poll.
    pub fn set_settlement_latency(&self, latency: Duration) {
        self.with(|s| s.settlement_latency = latency);
    }

    /// Delay for the next peer lookup. The expiry is read when the call
    /// arrives and delivered after the delay.
    pub fn queue_peer_latency(&self, latency: Duration) {
        self.with(|s| s.peer_latencies.push_back(latency));
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.with(|s| s.registered.clone())
    }
}

fn server_error(message: &str) -> ApiError {
    ApiError::Api {
        status: 500,
        message: message.to_string(),
    }
}

fn prices(hour: f64) -> PeriodPrices {
    PeriodPrices {
        hour: PriceValue(hour),
        day: Some(PriceValue(hour * 24.0)),
        month: None,
    }
}

impl MeterApi for FakeMeter {
    async fn create_account(&self) -> Result<CreatedAccount, ApiError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.calls.create += 1;
            Ok(CreatedAccount {
                account_id: AccountId::new(format!("FAKEACCOUNT{}", s.calls.create)).unwrap(),
                expiry_date: None,
            })
        })
    }

    async fn peer(&self) -> Result<PeerInfo, ApiError> {
        tokio::task::yield_now().await;
        let (answer, latency) = self.with(|s| {
            s.calls.peer += 1;
            let latency = s.peer_latencies.pop_front().unwrap_or_default();
            if s.fail_peer {
                return (Err(server_error("peer lookup failed")), latency);
            }
            let info = PeerInfo {
                account_id: Some("FAKEACCOUNT".into()),
                public_key: None,
                ip: Some(PeerIp::default()),
                expiry_date: s.expiry.format("%a, %d %b %Y %H:%M:%S UTC").to_string(),
            };
            (Ok(info), latency)
        });
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        answer
    }

    async fn price(&self) -> Result<PriceSnapshot, ApiError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.calls.price += 1;
            if s.fail_prices {
                return Err(server_error("price feed down"));
            }
            Ok(PriceSnapshot {
                satoshi: prices(s.prices.0),
                usd: prices(s.prices.1),
            })
        })
    }

    async fn register_public_key(&self, public_key: &str) -> Result<(), ApiError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.calls.register += 1;
            if s.fail_register {
                return Err(server_error("register failed"));
            }
            s.registered.push(public_key.to_string());
            Ok(())
        })
    }

    async fn assigned_address(&self) -> Result<AssignedAddress, ApiError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.calls.address += 1;
            if s.fail_address {
                return Err(server_error("no address pool"));
            }
            Ok(s.address.clone())
        })
    }

    async fn request_extension(&self, duration: Duration) -> Result<ExtensionResponse, ApiError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.calls.extend += 1;
            if let Some(message) = &s.reject_extension {
                return Err(ApiError::Api {
                    status: 400,
                    message: message.clone(),
                });
            }
            if s.grant_without_payment {
                s.expiry += chrono::Duration::from_std(duration).unwrap();
                return Ok(ExtensionResponse::Granted);
            }
            s.issued += 1;
            let invoice = s
                .invoices
                .pop_front()
                .unwrap_or_else(|| format!("lnbc1000u1pfake{}", s.issued));
            s.pending.insert(invoice.clone(), duration);
            Ok(ExtensionResponse::PaymentRequired { invoice })
        })
    }

    async fn settlement_status(&self, invoice: &str) -> Result<SettlementStatus, ApiError> {
        tokio::task::yield_now().await;
        let latency = self.with(|s| s.settlement_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.with(|s| {
            s.calls.settlement += 1;
            let step = s
                .settlements
                .get_mut(invoice)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Settle::Pending);
            match step {
                Settle::Completed => {
                    if let Some(duration) = s.pending.remove(invoice) {
                        s.expiry += chrono::Duration::from_std(duration).unwrap();
                    }
                    Ok(SettlementStatus::Completed)
                }
                Settle::Pending => Ok(SettlementStatus::Pending("timeout".into())),
                Settle::Unknown => Ok(SettlementStatus::UnknownInvoice),
                Settle::Fail => Err(server_error("settlement check failed")),
            }
        })
    }
}
