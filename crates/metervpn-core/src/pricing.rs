//! Duration pricing.
//!
//! Quotes are recomputed for every duration selection from a freshly fetched
//! server price table. The satoshi cost is rounded up so a quote never
//! understates what the invoice will ask for.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::types::{PeriodPrices, PriceValue};
use crate::api::{ApiError, MeterApi, PriceSnapshot};

/// Per-hour prices used for one quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub satoshi_per_hour: f64,
    pub fiat_per_hour: f64,
}

/// A price table with a non-positive or non-finite rate.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid price table: {0}")]
pub struct InvalidPriceTable(pub &'static str);

impl PriceTable {
    pub fn validate(&self) -> Result<(), InvalidPriceTable> {
        if !(self.satoshi_per_hour.is_finite() && self.satoshi_per_hour > 0.0) {
            return Err(InvalidPriceTable("satoshi per hour must be positive"));
        }
        if !(self.fiat_per_hour.is_finite() && self.fiat_per_hour > 0.0) {
            return Err(InvalidPriceTable("fiat per hour must be positive"));
        }
        Ok(())
    }
}

/// Cost of a requested number of hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationQuote {
    pub requested_hours: u32,
    pub satoshi_cost: u64,
    /// Unrounded; rounding happens at display time.
    pub fiat_cost: f64,
}

impl DurationQuote {
    /// Price `hours` against `table`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(hours: u32, table: &PriceTable) -> Self {
        let hours_f = f64::from(hours);
        Self {
            requested_hours: hours,
            satoshi_cost: (table.satoshi_per_hour * hours_f).ceil() as u64,
            fiat_cost: table.fiat_per_hour * hours_f,
        }
    }
}

/// Length of the server's "month" price period: 30.5 days.
pub const HOURS_PER_MONTH: u32 = 732;

/// Price of one standard period as shown in the price list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodPrice {
    pub hours: u32,
    pub satoshi_cost: u64,
    pub fiat_cost: f64,
    /// Computed from the hourly rate because the server sent no valid
    /// figure for this period.
    pub derived: bool,
}

impl PeriodPrice {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn resolve(
        hours: u32,
        sats: Option<PriceValue>,
        fiat: Option<PriceValue>,
        table: &PriceTable,
    ) -> Self {
        let valid = |v: Option<PriceValue>| v.map(|p| p.0).filter(|p| p.is_finite() && *p > 0.0);
        match (valid(sats), valid(fiat)) {
            (Some(sats), Some(fiat)) => Self {
                hours,
                satoshi_cost: sats.ceil() as u64,
                fiat_cost: fiat,
                derived: false,
            },
            _ => {
                let quote = DurationQuote::compute(hours, table);
                Self {
                    hours,
                    satoshi_cost: quote.satoshi_cost,
                    fiat_cost: quote.fiat_cost,
                    derived: true,
                }
            }
        }
    }
}

/// The server's hour, day and month prices.
///
/// Day and month use the server's own figures when present; the month is
/// priced as a flat amount and is not always 732 times the hourly rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSheet {
    pub table: PriceTable,
    pub hour: PeriodPrice,
    pub day: PeriodPrice,
    pub month: PeriodPrice,
}

impl PriceSheet {
    pub fn from_snapshot(snapshot: &PriceSnapshot) -> Result<Self, ApiError> {
        let table = snapshot.table()?;
        let period = |hours, pick: fn(&PeriodPrices) -> Option<PriceValue>| {
            PeriodPrice::resolve(hours, pick(&snapshot.satoshi), pick(&snapshot.usd), &table)
        };
        Ok(Self {
            table,
            hour: period(1, |p| Some(p.hour)),
            day: period(24, |p| p.day),
            month: period(HOURS_PER_MONTH, |p| p.month),
        })
    }
}

/// Where a quote's price table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    Server,
    /// Configured offline table, used only because the server fetch failed.
    Fallback,
}

/// Result of a quote request, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteState {
    /// Nothing selected; display placeholders rather than zero.
    NoQuote,
    Quoted {
        quote: DurationQuote,
        source: QuoteSource,
    },
    /// The price table could not be fetched.
    Unavailable { reason: String },
}

/// Normalise a raw duration selection into whole hours.
///
/// Missing or non-numeric selections (including the literal `"null"` the
/// empty select option carries) yield `None`.
pub fn parse_hours(selection: &str) -> Option<u32> {
    selection.trim().parse().ok()
}

/// Quotes durations against the server's price table.
pub struct PricingEngine<A> {
    api: Arc<A>,
    fallback: Option<PriceTable>,
}

impl<A: MeterApi> PricingEngine<A> {
    pub const fn new(api: Arc<A>, fallback: Option<PriceTable>) -> Self {
        Self { api, fallback }
    }

    /// Fetch the current price table.
    pub async fn price_table(&self) -> Result<PriceTable, ApiError> {
        self.api.price().await?.table()
    }

    /// Fetch the current prices for display.
    pub async fn price_sheet(&self) -> Result<PriceSheet, ApiError> {
        PriceSheet::from_snapshot(&self.api.price().await?)
    }

    /// Quote `selection` hours. Never fails; errors become `Unavailable`.
    pub async fn quote(&self, selection: Option<u32>) -> QuoteState {
        let Some(hours) = selection else {
            return QuoteState::NoQuote;
        };

        match self.price_table().await {
            Ok(table) => {
                let quote = DurationQuote::compute(hours, &table);
                debug!(hours, sats = quote.satoshi_cost, "Quoted duration");
                QuoteState::Quoted {
                    quote,
                    source: QuoteSource::Server,
                }
            }
            Err(e) => match self.fallback {
                Some(table) => {
                    warn!(error = %e, "Price fetch failed, quoting from fallback table");
                    QuoteState::Quoted {
                        quote: DurationQuote::compute(hours, &table),
                        source: QuoteSource::Fallback,
                    }
                }
                None => {
                    warn!(error = %e, "Price fetch failed");
                    QuoteState::Unavailable {
                        reason: e.to_string(),
                    }
                }
            },
        }
    }
}
