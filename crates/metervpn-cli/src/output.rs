//! Output formatting helpers.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use metervpn_core::ExtensionOutcome;
use metervpn_core::extension::PaymentObligation;
use metervpn_core::format::{PLACEHOLDER, QuoteDisplay, format_btc, format_fiat, with_commas};
use metervpn_core::lease::SessionLease;
use metervpn_core::pricing::{PeriodPrice, PriceSheet, QuoteSource, QuoteState};

pub fn write_prices(w: &mut impl Write, sheet: &PriceSheet) -> io::Result<()> {
    let rows: [(&str, &PeriodPrice); 3] = [
        ("1 hour", &sheet.hour),
        ("1 day", &sheet.day),
        ("1 month", &sheet.month),
    ];
    for (label, price) in rows {
        writeln!(
            w,
            "  {:<8} {:>12} sat  {} BTC  {}{}",
            label,
            with_commas(price.satoshi_cost),
            format_btc(price.satoshi_cost),
            format_fiat(price.fiat_cost),
            if price.derived { "  (from hourly rate)" } else { "" }
        )?;
    }
    Ok(())
}

pub fn write_quote(w: &mut impl Write, state: &QuoteState) -> io::Result<()> {
    let display = QuoteDisplay::from(state);
    match state {
        QuoteState::Quoted { quote, source } => {
            writeln!(w, "  Duration: {} hours", quote.requested_hours)?;
            if *source == QuoteSource::Fallback {
                writeln!(w, "  (server prices unavailable, using configured fallback)")?;
            }
        }
        QuoteState::NoQuote => writeln!(w, "  Duration: {PLACEHOLDER}")?,
        QuoteState::Unavailable { reason } => {
            writeln!(w, "  Prices unavailable: {reason}")?;
        }
    }
    writeln!(w, "  BTC:      {}", display.btc)?;
    writeln!(w, "  Sats:     {}", display.sats)?;
    writeln!(w, "  USD:      {}", display.fiat)?;
    Ok(())
}

pub fn write_lease(
    w: &mut impl Write,
    lease: Option<&SessionLease>,
    now: DateTime<Utc>,
) -> io::Result<()> {
    match lease {
        Some(lease) => {
            writeln!(w, "  Expires:   {}", lease.expiry.to_rfc2822())?;
            writeln!(w, "  Remaining: {}", lease.remaining_at(now))?;
            if !lease.is_active_at(now) {
                writeln!(w, "  Access has expired. Run: metervpn extend <HOURS>")?;
            }
        }
        None => {
            writeln!(w, "  Expires:   {PLACEHOLDER}")?;
            writeln!(w, "  Remaining: {PLACEHOLDER}")?;
        }
    }
    Ok(())
}

pub fn write_obligation(w: &mut impl Write, obligation: &PaymentObligation) -> io::Result<()> {
    writeln!(w, "Pay this Lightning invoice:")?;
    writeln!(w)?;
    writeln!(w, "{}", obligation.invoice)?;
    writeln!(w)?;
    writeln!(w, "  Amount: {}", obligation.amount)?;
    writeln!(w, "  URI:    {}", obligation.lightning_uri())?;
    Ok(())
}

pub fn write_outcome(
    w: &mut impl Write,
    outcome: &ExtensionOutcome,
    now: DateTime<Utc>,
) -> io::Result<()> {
    match outcome {
        ExtensionOutcome::Granted { lease } => {
            writeln!(w, "Extension granted.")?;
            write_lease(w, lease.as_ref(), now)?;
        }
        ExtensionOutcome::Settled { lease, .. } => {
            writeln!(w, "Payment received.")?;
            write_lease(w, lease.as_ref(), now)?;
        }
        ExtensionOutcome::TimedOut { obligation } => {
            writeln!(w, "No payment seen for {}.", obligation.invoice)?;
            writeln!(
                w,
                "If you pay it later the server may still credit it; check with: metervpn status"
            )?;
        }
        ExtensionOutcome::Superseded { generation } => {
            writeln!(w, "Request #{generation} was replaced by a newer one.")?;
        }
    }
    Ok(())
}
