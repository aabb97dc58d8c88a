//! Buy more lease time.
//!
//! Quotes the duration, submits the extension and, when the server asks for
//! payment, shows the invoice and waits for it to settle. Ctrl-C abandons
//! the wait; the invoice itself is left alone on the server.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metervpn_core::api::MeterApi;
use metervpn_core::extension::{ExtensionState, Phase};
use metervpn_core::lease::LeaseTracker;
use metervpn_core::poll::PollPolicy;
use metervpn_core::pricing::{PricingEngine, parse_hours};
use metervpn_core::{Config, ExtensionError, ExtensionOrchestrator, ExtensionOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::output::{write_obligation, write_outcome, write_quote};

/// Extend the lease by `hours` (whole hours, as typed by the user).
pub async fn run<A: MeterApi + 'static>(
    api: Arc<A>,
    config: &Config,
    hours: &str,
    no_wait: bool,
) -> anyhow::Result<()> {
    let hours = parse_hours(hours);
    let mut out = io::stdout();

    let pricing = PricingEngine::new(Arc::clone(&api), config.pricing.fallback);
    writeln!(out, "Quote:")?;
    write_quote(&mut out, &pricing.quote(hours).await)?;

    let tracker = Arc::new(LeaseTracker::new(Arc::clone(&api)));
    let orch = Arc::new(ExtensionOrchestrator::new(
        api,
        tracker,
        poll_policy(config, no_wait),
    ));
    let printer = (!no_wait).then(|| spawn_obligation_printer(orch.subscribe()));

    let result = tokio::select! {
        result = orch.submit(hours) => result,
        _ = tokio::signal::ctrl_c() => {
            orch.abandon().await;
            drop(orch);
            if let Some(printer) = printer {
                printer.await?;
            }
            writeln!(out, "Stopped waiting. The invoice was not cancelled on the server.")?;
            return Ok(());
        }
    };
    drop(orch);
    if let Some(printer) = printer {
        printer.await?;
    }

    match result {
        Ok(ExtensionOutcome::TimedOut { obligation }) if no_wait => {
            write_obligation(&mut out, &obligation)?;
            writeln!(out, "Not waiting for payment. Check afterwards with: metervpn status")?;
        }
        Ok(outcome) => write_outcome(&mut out, &outcome, Utc::now())?,
        Err(ExtensionError::NoSelection) => {
            anyhow::bail!("No duration selected. Pass whole hours, e.g.: metervpn extend 24")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// `--no-wait` stops right after the invoice is issued.
fn poll_policy(config: &Config, no_wait: bool) -> PollPolicy {
    let mut policy = config.poll_policy();
    if no_wait {
        policy.max_wait = Duration::ZERO;
    }
    policy
}

/// Print each request's invoice once, as soon as it is known.
fn spawn_obligation_printer(mut rx: watch::Receiver<ExtensionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shown = None;
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if let Some(text) = obligation_notice(&state, &mut shown) {
                let _ = io::stdout().write_all(text.as_bytes());
            }
        }
    })
}

/// Text to print for `state`, if it carries an invoice not yet shown.
fn obligation_notice(state: &ExtensionState, shown: &mut Option<u64>) -> Option<String> {
    let obligation = state.obligation.as_ref()?;
    if *shown == Some(state.generation) {
        return None;
    }
    *shown = Some(state.generation);

    let mut buf = Vec::new();
    write_obligation(&mut buf, obligation).ok()?;
    if matches!(state.phase, Phase::AwaitingPayment | Phase::Polling) {
        buf.extend_from_slice(b"\nWaiting for payment (Ctrl-C to stop waiting)...\n");
    }
    String::from_utf8(buf).ok()
}
