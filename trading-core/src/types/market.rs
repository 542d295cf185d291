use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Market segment a quote was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    /// USDT/USD-margined perpetual contracts
    Futures,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(MarketType::Spot),
            "futures" | "perp" | "perpetual" | "swap" => Ok(MarketType::Futures),
            other => Err(SymbolError::UnknownMarket(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Symbol is empty")]
    Empty,

    #[error("Symbol must be BASE-QUOTE, got: {0}")]
    Shape(String),

    #[error("Symbol segment must be uppercase alphanumeric: {0}")]
    Segment(String),

    #[error("Unknown market type: {0}")]
    UnknownMarket(String),
}

/// Exchange-independent pair identifier in `BASE-QUOTE` form (e.g., "BTC-USDT").
///
/// Construction validates that there are exactly two non-empty segments made
/// of uppercase ASCII letters and digits, so every value in the store is a
/// well-formed key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalSymbol(String);

impl CanonicalSymbol {
    /// Parse an already-canonical string
    pub fn parse(s: &str) -> Result<Self, SymbolError> {
        if s.is_empty() {
            return Err(SymbolError::Empty);
        }

        let mut parts = s.split('-');
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => (base, quote),
            _ => return Err(SymbolError::Shape(s.to_string())),
        };

        for segment in [base, quote] {
            if segment.is_empty() {
                return Err(SymbolError::Shape(s.to_string()));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            {
                return Err(SymbolError::Segment(segment.to_string()));
            }
        }

        Ok(Self(s.to_string()))
    }

    /// Build from separate base and quote segments
    pub fn from_parts(base: &str, quote: &str) -> Result<Self, SymbolError> {
        Self::parse(&format!("{}-{}", base, quote))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.split().0
    }

    pub fn quote(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        // Validated at construction: exactly one separator
        self.0.split_once('-').unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for CanonicalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CanonicalSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CanonicalSymbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanonicalSymbol> for String {
    fn from(symbol: CanonicalSymbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for CanonicalSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CanonicalSymbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}
