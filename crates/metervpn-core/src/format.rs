//! Display formatting shared by every front end.

use crate::pricing::QuoteState;

/// Shown instead of a number when no value is known.
pub const PLACEHOLDER: &str = "~";

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Group digits in threes: `1234567` -> `"1,234,567"`.
pub fn with_commas(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Satoshis as bitcoin with 8 decimals.
#[allow(clippy::cast_precision_loss)]
pub fn format_btc(sats: u64) -> String {
    format!("{:.8}", sats as f64 / SATS_PER_BTC)
}

/// Fiat amount as dollars with 4 decimals.
pub fn format_fiat(amount: f64) -> String {
    format!("${amount:.4}")
}

/// Text for the three quote fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteDisplay {
    pub btc: String,
    pub sats: String,
    pub fiat: String,
}

impl QuoteDisplay {
    fn placeholder() -> Self {
        Self {
            btc: PLACEHOLDER.to_string(),
            sats: PLACEHOLDER.to_string(),
            fiat: PLACEHOLDER.to_string(),
        }
    }
}

impl From<&QuoteState> for QuoteDisplay {
    fn from(state: &QuoteState) -> Self {
        match state {
            QuoteState::Quoted { quote, .. } => Self {
                btc: format_btc(quote.satoshi_cost),
                sats: with_commas(quote.satoshi_cost),
                fiat: format_fiat(quote.fiat_cost),
            },
            QuoteState::NoQuote | QuoteState::Unavailable { .. } => Self::placeholder(),
        }
    }
}
