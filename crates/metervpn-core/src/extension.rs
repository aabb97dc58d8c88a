//! Extension request orchestration.
//!
//! One orchestrator drives the purchase of lease time for one account:
//!
//! ```text
//! Idle -> Requesting -> Granted ------------------------------> Idle
//!                    -> AwaitingPayment -> Polling -> Settled -> Idle
//! ```
//!
//! `AwaitingPayment` covers the wait before the first settlement check;
//! `Polling` starts with that check.
//!
//! Every submit starts a new generation. The previous generation's token is
//! cancelled, so a superseded poll loop wakes at once and returns without
//! touching state; any result it was waiting for is dropped. State changes
//! are published on a `watch` channel and only apply while their generation
//! is still current.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ExtensionResponse, MeterApi, SettlementStatus};
use crate::format::with_commas;
use crate::invoice::decode_amount;
use crate::lease::{LeaseTracker, SessionLease};
use crate::poll::PollPolicy;

const SECS_PER_HOUR: u64 = 3_600;

/// Where the orchestrator is in the purchase flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Requesting,
    Granted,
    AwaitingPayment,
    Polling,
    Settled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Granted => "granted",
            Self::AwaitingPayment => "awaiting payment",
            Self::Polling => "waiting for settlement",
            Self::Settled => "settled",
        };
        f.write_str(name)
    }
}

/// Best-effort amount read from the invoice prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedAmount {
    Satoshis(u64),
    Unknown,
}

impl fmt::Display for DecodedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satoshis(sats) => write!(f, "{} sat", with_commas(*sats)),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// An invoice the server wants paid before extending the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentObligation {
    pub invoice: String,
    pub amount: DecodedAmount,
}

impl PaymentObligation {
    /// Wrap `invoice`, decoding its amount for display.
    ///
    /// A decode failure only makes the amount `Unknown`.
    pub fn new(invoice: String) -> Self {
        let amount = match decode_amount(&invoice) {
            Ok(amount) => DecodedAmount::Satoshis(amount.satoshis()),
            Err(e) => {
                debug!(error = %e, "Could not decode invoice amount");
                DecodedAmount::Unknown
            }
        };
        Self { invoice, amount }
    }

    /// `lightning:` URI for wallets and QR rendering.
    pub fn lightning_uri(&self) -> String {
        format!("lightning:{}", self.invoice)
    }
}

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtensionState {
    pub phase: Phase,
    /// Request this state belongs to; 0 before the first submit.
    pub generation: u64,
    pub requested: Option<Duration>,
    pub obligation: Option<PaymentObligation>,
}

impl ExtensionState {
    const fn idle(generation: u64) -> Self {
        Self {
            phase: Phase::Idle,
            generation,
            requested: None,
            obligation: None,
        }
    }
}

/// How a submit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionOutcome {
    /// Extended without payment. `lease` is `None` if the follow-up refresh
    /// failed; the tracker then still holds the previous lease.
    Granted { lease: Option<SessionLease> },
    /// The invoice was paid and the lease refreshed.
    Settled {
        obligation: PaymentObligation,
        lease: Option<SessionLease>,
    },
    /// Polling gave up. The invoice may still be paid later.
    TimedOut { obligation: PaymentObligation },
    /// A newer request (or an abandon) replaced this one.
    Superseded { generation: u64 },
}

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("No duration selected")]
    NoSelection,

    #[error("Extension rejected: {0}")]
    Rejected(#[source] ApiError),
}

#[derive(Debug)]
struct ActiveRequest {
    generation: u64,
    token: CancellationToken,
}

/// Drives extension requests for one account.
pub struct ExtensionOrchestrator<A> {
    api: Arc<A>,
    lease: Arc<LeaseTracker<A>>,
    policy: PollPolicy,
    active: Mutex<ActiveRequest>,
    state: watch::Sender<ExtensionState>,
}

impl<A: MeterApi> ExtensionOrchestrator<A> {
    pub fn new(api: Arc<A>, lease: Arc<LeaseTracker<A>>, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(ExtensionState::default());
        Self {
            api,
            lease,
            policy,
            active: Mutex::new(ActiveRequest {
                generation: 0,
                token: CancellationToken::new(),
            }),
            state,
        }
    }

    pub fn state(&self) -> ExtensionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExtensionState> {
        self.state.subscribe()
    }

    pub const fn lease(&self) -> &Arc<LeaseTracker<A>> {
        &self.lease
    }

    /// Buy `hours` of access. `None` or zero is rejected without a request.
    pub async fn submit(&self, hours: Option<u32>) -> Result<ExtensionOutcome, ExtensionError> {
        let hours = hours.filter(|h| *h > 0).ok_or(ExtensionError::NoSelection)?;
        self.submit_duration(Duration::from_secs(u64::from(hours) * SECS_PER_HOUR))
            .await
    }

    /// Buy `duration` of access, superseding any request still in flight.
    pub async fn submit_duration(
        &self,
        duration: Duration,
    ) -> Result<ExtensionOutcome, ExtensionError> {
        if duration.as_secs() == 0 {
            return Err(ExtensionError::NoSelection);
        }
        let (generation, token) = self.begin(duration).await;
        info!(
            generation,
            duration_secs = duration.as_secs(),
            "Requesting extension"
        );

        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(ExtensionOutcome::Superseded { generation }),
            response = self.api.request_extension(duration) => response,
        };

        match response {
            Err(e) => {
                if !self.update_if_current(generation, |s| *s = ExtensionState::idle(generation)) {
                    return Ok(ExtensionOutcome::Superseded { generation });
                }
                warn!(generation, error = %e, "Extension request failed");
                Err(ExtensionError::Rejected(e))
            }
            Ok(ExtensionResponse::Granted) => {
                if !self.update_if_current(generation, |s| s.phase = Phase::Granted) {
                    return Ok(ExtensionOutcome::Superseded { generation });
                }
                info!(generation, "Extension granted without payment");
                let lease = self.refresh_lease().await;
                self.update_if_current(generation, |s| *s = ExtensionState::idle(generation));
                Ok(ExtensionOutcome::Granted { lease })
            }
            Ok(ExtensionResponse::PaymentRequired { invoice }) => {
                let obligation = PaymentObligation::new(invoice);
                let published = self.update_if_current(generation, |s| {
                    s.phase = Phase::AwaitingPayment;
                    s.obligation = Some(obligation.clone());
                });
                if !published {
                    return Ok(ExtensionOutcome::Superseded { generation });
                }
                info!(generation, amount = %obligation.amount, "Payment required");
                self.poll_settlement(generation, &token, obligation).await
            }
        }
    }

    /// Drop the current request, if any, and return to `Idle`.
    ///
    /// The server is not told; a later payment of the dropped invoice is
    /// simply never observed here.
    pub async fn abandon(&self) {
        let mut active = self.active.lock().await;
        active.token.cancel();
        active.generation += 1;
        self.state
            .send_replace(ExtensionState::idle(active.generation));
        debug!(generation = active.generation, "Extension abandoned");
    }

    /// Start a new generation and cancel the previous one.
    async fn begin(&self, duration: Duration) -> (u64, CancellationToken) {
        let mut active = self.active.lock().await;
        active.token.cancel();
        active.token = CancellationToken::new();
        active.generation += 1;
        self.state.send_replace(ExtensionState {
            phase: Phase::Requesting,
            generation: active.generation,
            requested: Some(duration),
            obligation: None,
        });
        (active.generation, active.token.clone())
    }

    /// Apply `update` only if `generation` is still the published one.
    fn update_if_current(&self, generation: u64, update: impl FnOnce(&mut ExtensionState)) -> bool {
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            update(state);
            true
        })
    }

    async fn poll_settlement(
        &self,
        generation: u64,
        token: &CancellationToken,
        obligation: PaymentObligation,
    ) -> Result<ExtensionOutcome, ExtensionError> {
        let started = Instant::now();
        // Neither a backoff sleep nor an in-flight long-poll outlives this.
        let deadline = started + self.policy.max_wait;
        let mut attempt: u32 = 0;
        let settled = loop {
            if !self.policy.should_continue(attempt, started.elapsed()) {
                break false;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            tokio::select! {
                biased;
                () = token.cancelled() => return Ok(ExtensionOutcome::Superseded { generation }),
                () = tokio::time::sleep_until(deadline) => break false,
                () = tokio::time::sleep(delay) => {}
            }
            if attempt == 0 && !self.update_if_current(generation, |s| s.phase = Phase::Polling) {
                return Ok(ExtensionOutcome::Superseded { generation });
            }

            let status = tokio::select! {
                biased;
                () = token.cancelled() => return Ok(ExtensionOutcome::Superseded { generation }),
                () = tokio::time::sleep_until(deadline) => break false,
                status = self.api.settlement_status(&obligation.invoice) => status,
            };
            attempt += 1;

            match status {
                Ok(SettlementStatus::Completed) => break true,
                Ok(SettlementStatus::Pending(result)) => {
                    debug!(generation, attempt, %result, "Invoice not settled yet");
                }
                Ok(SettlementStatus::UnknownInvoice) => {
                    debug!(generation, attempt, "Server does not know the invoice yet");
                }
                Err(e) => {
                    warn!(generation, attempt, error = %e, "Settlement check failed");
                }
            }
        };

        if !settled {
            if !self.update_if_current(generation, |s| *s = ExtensionState::idle(generation)) {
                return Ok(ExtensionOutcome::Superseded { generation });
            }
            warn!(
                generation,
                attempts = attempt,
                waited_secs = started.elapsed().as_secs(),
                "Gave up waiting for settlement"
            );
            return Ok(ExtensionOutcome::TimedOut { obligation });
        }

        if !self.update_if_current(generation, |s| s.phase = Phase::Settled) {
            return Ok(ExtensionOutcome::Superseded { generation });
        }
        info!(generation, attempts = attempt, "Invoice settled");
        let lease = self.refresh_lease().await;
        self.update_if_current(generation, |s| *s = ExtensionState::idle(generation));
        Ok(ExtensionOutcome::Settled { obligation, lease })
    }

    async fn refresh_lease(&self) -> Option<SessionLease> {
        // Failures are logged by the tracker, which keeps the stale lease.
        self.lease.refresh().await.ok()
    }
}
