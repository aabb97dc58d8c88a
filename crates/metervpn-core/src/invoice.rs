//! Lightning payment request amount decoding.
//!
//! Only the human-readable prefix is inspected: `ln` + network tag + optional
//! amount + optional multiplier, terminated by the `1` separator. The data
//! part is never read, so the decoded amount is display information only.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Prefix with an amount: network tag, digits, optional multiplier, separator.
static AMOUNT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ln(?:bcrt|bc|tbs|tb|sb)(?P<amount>[0-9]+)(?P<multiplier>[munp])?1")
        .expect("static regex is valid")
});

/// Prefix of a request that leaves the amount to the payer.
static AMOUNTLESS_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ln(?:bcrt|bc|tbs|tb|sb)1").expect("static regex is valid"));

/// Picobitcoin per satoshi.
const PICO_PER_SAT: u128 = 10_000;

/// Why an invoice amount could not be decoded.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvoiceDecodeError {
    #[error("not a Lightning payment request")]
    MalformedPrefix,
    #[error("payment request carries no amount")]
    MissingAmount,
    #[error("payment request amount is out of range")]
    AmountOutOfRange,
}

/// Amount multiplier letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplier {
    Milli,
    Micro,
    Nano,
    Pico,
}

impl Multiplier {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "m" => Some(Self::Milli),
            "u" => Some(Self::Micro),
            "n" => Some(Self::Nano),
            "p" => Some(Self::Pico),
            _ => None,
        }
    }

    /// Picobitcoin in one unit of this multiplier.
    const fn pico_per_unit(self) -> u128 {
        match self {
            Self::Milli => 1_000_000_000,
            Self::Micro => 1_000_000,
            Self::Nano => 1_000,
            Self::Pico => 1,
        }
    }
}

/// Exact invoice amount, held in picobitcoin so no precision is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvoiceAmount {
    pico_btc: u128,
}

impl InvoiceAmount {
    pub const fn from_pico_btc(pico_btc: u128) -> Self {
        Self { pico_btc }
    }

    pub const fn pico_btc(self) -> u128 {
        self.pico_btc
    }

    /// Whole satoshis, rounded to nearest (half up).
    #[allow(clippy::cast_possible_truncation)]
    pub const fn satoshis(self) -> u64 {
        let sats = (self.pico_btc + PICO_PER_SAT / 2) / PICO_PER_SAT;
        if sats > u64::MAX as u128 {
            u64::MAX
        } else {
            sats as u64
        }
    }
}

impl fmt::Display for InvoiceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.satoshis())
    }
}

/// Decode the amount of a Lightning payment request.
///
/// Accepts upper-case requests and a leading `lightning:` URI scheme.
pub fn decode_amount(invoice: &str) -> Result<InvoiceAmount, InvoiceDecodeError> {
    let normalised = invoice.trim().to_ascii_lowercase();
    let request = normalised
        .strip_prefix("lightning:")
        .unwrap_or(&normalised);

    let Some(caps) = AMOUNT_PREFIX.captures(request) else {
        return Err(if AMOUNTLESS_PREFIX.is_match(request) {
            InvoiceDecodeError::MissingAmount
        } else {
            InvoiceDecodeError::MalformedPrefix
        });
    };

    let amount: u128 = caps["amount"]
        .parse()
        .map_err(|_| InvoiceDecodeError::AmountOutOfRange)?;
    let per_unit = match caps.name("multiplier") {
        Some(m) => Multiplier::from_letter(m.as_str())
            .ok_or(InvoiceDecodeError::MalformedPrefix)?
            .pico_per_unit(),
        // Whole bitcoin
        None => 1_000_000_000_000,
    };
    let pico_btc = amount
        .checked_mul(per_unit)
        .ok_or(InvoiceDecodeError::AmountOutOfRange)?;
    Ok(InvoiceAmount::from_pico_btc(pico_btc))
}
