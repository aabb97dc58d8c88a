//! Lease status, once or as a live countdown.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metervpn_core::api::MeterApi;
use metervpn_core::lease::LeaseTracker;
use tokio::sync::watch;
use tracing::warn;

use crate::output::write_lease;

/// How often the countdown is redrawn between server refreshes.
const REDRAW_INTERVAL: Duration = Duration::from_secs(60);

/// Show the lease. With `follow`, keep refreshing until Ctrl-C.
pub async fn run<A: MeterApi + 'static>(
    tracker: Arc<LeaseTracker<A>>,
    follow: bool,
    refresh_interval: Duration,
) -> anyhow::Result<()> {
    let first = tracker.refresh().await;
    print_lease(&tracker)?;
    if !follow {
        first?;
        return Ok(());
    }
    if let Err(e) = first {
        warn!(error = %e, "Initial lease fetch failed; will keep trying");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = Arc::clone(&tracker).spawn_refresh_task(refresh_interval, shutdown_rx);
    let mut lease_rx = tracker.subscribe();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    redraw.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = lease_rx.changed() => print_lease(&tracker)?,
            _ = redraw.tick() => print_lease(&tracker)?,
        }
    }

    let _ = shutdown_tx.send(true);
    refresher.await?;
    Ok(())
}

fn print_lease<A: MeterApi>(tracker: &LeaseTracker<A>) -> io::Result<()> {
    let mut out = io::stdout();
    writeln!(out, "Lease:")?;
    write_lease(&mut out, tracker.current().as_ref(), Utc::now())
}
