//! Manufacturability verdict returned by the external gate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The gate's judgment of one canonical image.
///
/// Immutable once received; a new upload replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturabilityVerdict {
    /// Whether the design can be printed.
    pub is_printable: bool,
    /// Recommended printed scale in millimetres. Clamped to the print
    /// bounds before use.
    #[serde(default)]
    pub recommended_scale: Option<f64>,
    /// Suggested filament colors, most dominant first.
    #[serde(default)]
    pub suggested_colors: Vec<String>,
    /// Estimated price of the finished keychain.
    #[serde(default)]
    pub estimated_price: Option<Price>,
    /// Human-readable explanation, surfaced verbatim.
    #[serde(default)]
    pub reasoning: String,
}

/// A non-negative amount of money in integer minor units (cents).
///
/// Serialized as a decimal string such as `"12.50"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price {
    cents: u64,
}

impl Price {
    /// A price of `cents` minor units.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self { cents }
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.cents
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

/// A price string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid price {0:?}: expected a non-negative decimal with at most two fraction digits")]
pub struct PriceParseError(String);

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PriceParseError(s.to_string());
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let whole: u64 = whole.parse().map_err(|_| err())?;
        let frac: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Self::from_cents)
            .ok_or_else(err)
    }
}

impl TryFrom<String> for Price {
    type Error = PriceParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Price> for String {
    fn from(price: Price) -> Self {
        price.to_string()
    }
}
