//! Price and quote subcommands.

use std::io::{self, Write};

use metervpn_core::api::MeterApi;
use metervpn_core::pricing::{PricingEngine, parse_hours};

use crate::output::{write_prices, write_quote};

/// Print the server's hour, day and month prices.
pub async fn price<A: MeterApi>(engine: &PricingEngine<A>) -> anyhow::Result<()> {
    let sheet = engine.price_sheet().await?;
    let mut out = io::stdout();
    writeln!(out, "Current prices:")?;
    write_prices(&mut out, &sheet)?;
    Ok(())
}

/// Quote a duration given as whole hours.
///
/// An unparseable selection prints placeholders rather than failing.
pub async fn quote<A: MeterApi>(engine: &PricingEngine<A>, hours: &str) -> anyhow::Result<()> {
    let state = engine.quote(parse_hours(hours)).await;
    let mut out = io::stdout();
    writeln!(out, "Quote:")?;
    write_quote(&mut out, &state)?;
    Ok(())
}
