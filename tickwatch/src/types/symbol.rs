//! Normalized ticker symbols.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Letter first, up to ten letters/digits, optional `.`/`-` class suffix.
static TICKER_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9]{0,9}(?:[.\-][A-Z0-9]{1,4})?$").expect("ticker regex is valid")
});

/// A normalized ticker symbol (trimmed, uppercased, shape-checked).
///
/// `Symbol` is the key for every set and record in the crate. The only way
/// to build one is [`Symbol::parse`], so equality is case-insensitive by
/// construction and the core never sees raw input.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate raw input.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if TICKER_SHAPE.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(Error::InvalidSymbol(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl std::str::FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("AAPL", "AAPL"; "already normalized")]
    #[test_case("  tsla ", "TSLA"; "trimmed and uppercased")]
    #[test_case("brk.b", "BRK.B"; "class suffix")]
    #[test_case("BTC-USD", "BTC-USD"; "pair suffix")]
    #[test_case("SPY500", "SPY500"; "digits after first letter")]
    fn accepts(raw: &str, expected: &str) {
        assert_eq!(Symbol::parse(raw).unwrap().as_str(), expected);
    }

    #[test_case(""; "empty")]
    #[test_case("   "; "whitespace only")]
    #[test_case("1ABC"; "leading digit")]
    #[test_case("AB CD"; "inner space")]
    #[test_case("ABCDEFGHIJK"; "too long")]
    #[test_case("BRK."; "dangling separator")]
    #[test_case("$AAPL"; "cashtag prefix")]
    fn rejects(raw: &str) {
        assert!(matches!(Symbol::parse(raw), Err(Error::InvalidSymbol(_))));
    }

    #[test]
    fn equality_is_case_insensitive_by_construction() {
        assert_eq!(Symbol::parse("nvda").unwrap(), Symbol::parse("NVDA").unwrap());
    }

    #[test]
    fn deserialization_validates() {
        let ok: Symbol = serde_json::from_str("\"msft\"").unwrap();
        assert_eq!(ok.as_str(), "MSFT");
        assert!(serde_json::from_str::<Symbol>("\"not a ticker\"").is_err());
    }
}
