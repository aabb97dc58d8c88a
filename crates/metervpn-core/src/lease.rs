//! Session lease tracking.
//!
//! The server is the only authority on when a lease ends. The tracker keeps
//! the last good value it saw and publishes every replacement on a `watch`
//! channel; a failed refresh never blanks it. Overlapping refreshes are
//! ordered by when they started, so a slow response cannot overwrite one
//! the server gave later.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiError, MeterApi};

/// When the account's network access ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionLease {
    pub expiry: DateTime<Utc>,
}

impl SessionLease {
    pub const fn new(expiry: DateTime<Utc>) -> Self {
        Self { expiry }
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> RemainingTime {
        RemainingTime::between(self.expiry, now)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

/// Countdown split into whole units, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemainingTime {
    pub days: u64,
    /// Hours within the day (0-23).
    pub hours: u64,
    /// Minutes within the hour (0-59).
    pub minutes: u64,
}

impl RemainingTime {
    /// Time from `now` until `expiry`, clamped at zero.
    #[allow(clippy::cast_sign_loss)]
    pub fn between(expiry: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let secs = (expiry - now).num_seconds().max(0) as u64;
        Self {
            days: secs / 86_400,
            hours: secs % 86_400 / 3_600,
            minutes: secs % 3_600 / 60,
        }
    }

    pub const fn is_zero(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d {}h {}m", self.days, self.hours, self.minutes)
    }
}

/// Parse the server's `expiryDate`.
///
/// The server writes RFC 1123 with a `UTC` zone name, which is not strictly
/// RFC 2822, so that form is parsed by hand after the standard ones.
pub fn parse_expiry(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let local = ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|zone| text.strip_suffix(zone))?;
    NaiveDateTime::parse_from_str(local.trim_end(), "%a, %d %b %Y %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A refresh that failed; the previous lease is still the one to display.
#[derive(Debug, Error)]
#[error("lease refresh failed: {source}")]
pub struct LeaseError {
    pub source: ApiError,
    /// Last good lease, if any.
    pub stale: Option<SessionLease>,
}

/// Holds the account's current lease.
pub struct LeaseTracker<A> {
    api: Arc<A>,
    lease: watch::Sender<Option<SessionLease>>,
    /// Sequence handed to the next refresh.
    next_seq: AtomicU64,
    /// Sequence of the refresh whose lease is published; only written while
    /// the channel's write lock is held.
    published_seq: AtomicU64,
}

impl<A: MeterApi> LeaseTracker<A> {
    pub fn new(api: Arc<A>) -> Self {
        let (lease, _) = watch::channel(None);
        Self {
            api,
            lease,
            next_seq: AtomicU64::new(1),
            published_seq: AtomicU64::new(0),
        }
    }

    /// Receive every lease replacement.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionLease>> {
        self.lease.subscribe()
    }

    /// Last lease fetched, if any.
    pub fn current(&self) -> Option<SessionLease> {
        *self.lease.borrow()
    }

    /// Fetch the lease from the server and publish it.
    ///
    /// If a refresh that started later has already published, this response
    /// is discarded and the newer lease is returned instead.
    pub async fn refresh(&self) -> Result<SessionLease, LeaseError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        match self.fetch().await {
            Ok(lease) => {
                let mut superseded = None;
                let changed = self.lease.send_if_modified(|current| {
                    if self.published_seq.load(Ordering::Relaxed) > seq {
                        superseded = *current;
                        return false;
                    }
                    self.published_seq.store(seq, Ordering::Relaxed);
                    if *current == Some(lease) {
                        false
                    } else {
                        *current = Some(lease);
                        true
                    }
                });
                if let Some(newer) = superseded {
                    debug!(
                        seq,
                        stale = %lease.expiry,
                        expiry = %newer.expiry,
                        "Discarding out-of-order lease response"
                    );
                    return Ok(newer);
                }
                debug!(seq, expiry = %lease.expiry, changed, "Lease refreshed");
                Ok(lease)
            }
            Err(source) => {
                warn!(error = %source, "Lease refresh failed, keeping previous value");
                Err(LeaseError {
                    source,
                    stale: self.current(),
                })
            }
        }
    }

    async fn fetch(&self) -> Result<SessionLease, ApiError> {
        let peer = self.api.peer().await?;
        parse_expiry(&peer.expiry_date)
            .map(SessionLease::new)
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!("unparseable expiryDate {:?}", peer.expiry_date))
            })
    }
}

impl<A: MeterApi + 'static> LeaseTracker<A> {
    /// Refresh the lease every `interval` until `shutdown` changes.
    ///
    /// Runs on its own schedule, independent of any settlement polling.
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        // Failures are logged inside refresh(); the stale lease stays.
                        let _ = self.refresh().await;
                    }
                    _ = shutdown.changed() => {
                        info!("Lease refresh task shutting down");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testing::{FakeMeter, start_expiry};

    fn at(secs_after: i64) -> DateTime<Utc> {
        start_expiry() + chrono::Duration::seconds(secs_after)
    }

    #[test]
    fn remaining_splits_into_units() {
        let now = start_expiry();
        let expiry = now + chrono::Duration::seconds(2 * 86_400 + 5 * 3_600 + 7 * 60 + 59);
        assert_eq!(
            RemainingTime::between(expiry, now),
            RemainingTime {
                days: 2,
                hours: 5,
                minutes: 7
            }
        );
    }

    #[test]
    fn expired_lease_reports_zero() {
        let lease = SessionLease::new(start_expiry());
        let remaining = lease.remaining_at(at(3_600));
        assert!(remaining.is_zero());
        assert_eq!(remaining.to_string(), "0d 0h 0m");
        assert!(!lease.is_active_at(at(1)));
    }

    #[test]
    fn remaining_display() {
        let remaining = RemainingTime {
            days: 29,
            hours: 23,
            minutes: 1,
        };
        assert_eq!(remaining.to_string(), "29d 23h 1m");
    }

    #[test]
    fn parse_server_rfc1123_utc() {
        let parsed = parse_expiry("Mon, 19 Oct 2026 12:00:00 UTC").unwrap();
        assert_eq!(parsed, start_expiry());
    }

    #[test]
    fn parse_gmt_and_offsets() {
        assert_eq!(
            parse_expiry("Mon, 19 Oct 2026 12:00:00 GMT").unwrap(),
            start_expiry()
        );
        assert_eq!(
            parse_expiry("Mon, 19 Oct 2026 14:00:00 +0200").unwrap(),
            start_expiry()
        );
        assert_eq!(
            parse_expiry("2026-10-19T12:00:00Z").unwrap(),
            start_expiry()
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_expiry("").is_none());
        assert!(parse_expiry("tomorrow").is_none());
        assert!(parse_expiry("Mon, 99 Oct 2026 12:00:00 UTC").is_none());
    }

    #[tokio::test]
    async fn refresh_publishes_lease() {
        let api = Arc::new(FakeMeter::new());
        let tracker = LeaseTracker::new(Arc::clone(&api));
        let mut rx = tracker.subscribe();
        assert!(tracker.current().is_none());

        let lease = tracker.refresh().await.unwrap();
        assert_eq!(lease.expiry, start_expiry());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(lease));
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let api = Arc::new(FakeMeter::new());
        let tracker = LeaseTracker::new(Arc::clone(&api));
        let now = at(-90_061);

        let first = tracker.refresh().await.unwrap();
        let rx = tracker.subscribe();
        let second = tracker.refresh().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.remaining_at(now), second.remaining_at(now));
        assert_eq!(
            first.remaining_at(now),
            RemainingTime {
                days: 1,
                hours: 1,
                minutes: 1
            }
        );
        // An unchanged lease does not wake watchers
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_lease() {
        let api = Arc::new(FakeMeter::new());
        let tracker = LeaseTracker::new(Arc::clone(&api));
        let good = tracker.refresh().await.unwrap();

        api.fail_peer(true);
        let err = tracker.refresh().await.unwrap_err();
        assert_eq!(err.stale, Some(good));
        assert_eq!(tracker.current(), Some(good));
    }

    #[tokio::test]
    async fn failed_first_refresh_has_no_stale_value() {
        let api = Arc::new(FakeMeter::new());
        api.fail_peer(true);
        let tracker = LeaseTracker::new(api);
        let err = tracker.refresh().await.unwrap_err();
        assert!(err.stale.is_none());
        assert!(tracker.current().is_none());
    }

    #[tokio::test]
    async fn server_may_move_expiry_backwards() {
        let api = Arc::new(FakeMeter::new());
        let tracker = LeaseTracker::new(Arc::clone(&api));
        tracker.refresh().await.unwrap();

        let earlier = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        api.set_expiry(earlier);
        assert_eq!(tracker.refresh().await.unwrap().expiry, earlier);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_earlier_refresh_does_not_overwrite_newer_lease() {
        let api = Arc::new(FakeMeter::new());
        let tracker = Arc::new(LeaseTracker::new(Arc::clone(&api)));
        api.queue_peer_latency(Duration::from_secs(5));
        api.queue_peer_latency(Duration::from_secs(1));

        let timer = tokio::spawn({
            let tracker = Arc::clone(&tracker);
            async move { tracker.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let settled = start_expiry() + chrono::Duration::hours(2);
        api.set_expiry(settled);
        let after_settle = tracker.refresh().await.unwrap();
        assert_eq!(after_settle.expiry, settled);

        let from_timer = timer.await.unwrap().unwrap();
        assert_eq!(from_timer.expiry, settled);
        assert_eq!(tracker.current().unwrap().expiry, settled);
        assert_eq!(tracker.current().unwrap().expiry, api.expiry());
        assert_eq!(api.calls().peer, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_later_refresh_still_publishes() {
        let api = Arc::new(FakeMeter::new());
        let tracker = Arc::new(LeaseTracker::new(Arc::clone(&api)));
        api.queue_peer_latency(Duration::from_secs(1));
        api.queue_peer_latency(Duration::from_secs(5));

        let first = tokio::spawn({
            let tracker = Arc::clone(&tracker);
            async move { tracker.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let settled = start_expiry() + chrono::Duration::hours(2);
        api.set_expiry(settled);
        let second = tracker.refresh().await.unwrap();

        assert_eq!(first.await.unwrap().unwrap().expiry, start_expiry());
        assert_eq!(second.expiry, settled);
        assert_eq!(tracker.current().unwrap().expiry, settled);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_ticks_until_shutdown() {
        let api = Arc::new(FakeMeter::new());
        let tracker = Arc::new(LeaseTracker::new(Arc::clone(&api)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle =
            Arc::clone(&tracker).spawn_refresh_task(Duration::from_secs(15), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(46)).await;
        assert_eq!(api.calls().peer, 3);
        assert_eq!(tracker.current().unwrap().expiry, start_expiry());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.calls().peer, 3);
    }
}
