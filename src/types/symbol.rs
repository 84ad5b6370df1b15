#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A spot trading pair in `BASE/QUOTE` form, e.g. `BTC/USDT`.
///
/// Unlike the closed pair enum this replaces, the universe here is open:
/// hundreds of USDT-quoted symbols come and go as the exchange lists and
/// delists markets, so the type is a validated wrapper around two asset
/// strings rather than a fixed set of variants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

/// Leveraged/tokenized product markers excluded from the spot universe.
const LEVERAGED_MARKERS: [&str; 4] = ["UP", "DOWN", "BEAR", "BULL"];

/// Stablecoin-vs-USDT pairs excluded from the altcoin universe alongside BTC/ETH.
const STABLECOIN_BASES: [&str; 5] = ["USDC", "BUSD", "TUSD", "FDUSD", "DAI"];

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    pub fn usdt(base: impl Into<String>) -> Self {
        Self::new(base, "USDT")
    }

    pub fn btc_usdt() -> Self {
        Self::usdt("BTC")
    }

    pub fn eth_usdt() -> Self {
        Self::usdt("ETH")
    }

    /// Parses `BASE/QUOTE` or exchange-native `BASEQUOTE` (quote assumed USDT
    /// when no separator is present, matching the donor's bare-ticker style).
    pub fn parse(s: &str) -> Option<Self> {
        if let Some((base, quote)) = s.split_once('/') {
            if base.is_empty() || quote.is_empty() {
                return None;
            }
            return Some(Self::new(base, quote));
        }
        let upper = s.to_uppercase();
        if let Some(base) = upper.strip_suffix("USDT") {
            if !base.is_empty() {
                return Some(Self::usdt(base));
            }
        }
        None
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    pub fn is_usdt_quoted(&self) -> bool {
        self.quote == "USDT"
    }

    /// Exchange-native compact form, e.g. `BTCUSDT` (no separator).
    pub fn exchange_format(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// True if this symbol would be excluded from the spot trading universe
    /// under the leveraged/tokenized-product filter rule.
    pub fn is_leveraged_product(&self) -> bool {
        LEVERAGED_MARKERS.iter().any(|m| self.base.contains(m))
    }

    pub fn is_stablecoin_pair(&self) -> bool {
        STABLECOIN_BASES.contains(&self.base.as_str())
    }

    /// True if this symbol belongs to the "altcoin universe": USDT spot,
    /// not BTC or ETH, not a stablecoin pair, not a leveraged product.
    pub fn is_altcoin(&self) -> bool {
        self.is_usdt_quoted()
            && self.base != "BTC"
            && self.base != "ETH"
            && !self.is_stablecoin_pair()
            && !self.is_leveraged_product()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Valid candle/indicator timeframes. `M1` and `M30` are accepted on the
/// exchange-fetch boundary (§6) but are not valid TSDB rollup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1m",
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::M30 => "30m",
            TimeFrame::H1 => "1h",
            TimeFrame::H4 => "4h",
            TimeFrame::D1 => "1d",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(TimeFrame::M1),
            "5m" => Some(TimeFrame::M5),
            "15m" => Some(TimeFrame::M15),
            "30m" => Some(TimeFrame::M30),
            "1h" => Some(TimeFrame::H1),
            "4h" => Some(TimeFrame::H4),
            "1d" => Some(TimeFrame::D1),
            _ => None,
        }
    }

    pub fn to_minutes(&self) -> i64 {
        match self {
            TimeFrame::M1 => 1,
            TimeFrame::M5 => 5,
            TimeFrame::M15 => 15,
            TimeFrame::M30 => 30,
            TimeFrame::H1 => 60,
            TimeFrame::H4 => 240,
            TimeFrame::D1 => 1440,
        }
    }

    pub fn to_milliseconds(&self) -> i64 {
        self.to_minutes() * 60 * 1000
    }

    /// Rollup targets derivable from the stored 5m series (§4.2).
    pub fn is_rollup_target(&self) -> bool {
        matches!(
            self,
            TimeFrame::M5 | TimeFrame::M15 | TimeFrame::H1 | TimeFrame::H4 | TimeFrame::D1
        )
    }

    /// Timeframes the screener accepts for a pass (§4.5).
    pub fn is_screenable(&self) -> bool {
        matches!(self, TimeFrame::M5 | TimeFrame::M15 | TimeFrame::H1 | TimeFrame::H4)
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn altcoin_universe_excludes_majors_and_stables_and_leveraged() {
        assert!(!Symbol::usdt("BTC").is_altcoin());
        assert!(!Symbol::usdt("ETH").is_altcoin());
        assert!(!Symbol::usdt("USDC").is_altcoin());
        assert!(!Symbol::new("BTCUP", "USDT").is_altcoin());
        assert!(Symbol::usdt("SOL").is_altcoin());
    }

    #[test]
    fn parse_roundtrips_both_formats() {
        assert_eq!(Symbol::parse("SOL/USDT").unwrap(), Symbol::usdt("SOL"));
        assert_eq!(Symbol::parse("SOLUSDT").unwrap(), Symbol::usdt("SOL"));
        assert_eq!(Symbol::usdt("SOL").exchange_format(), "SOLUSDT");
    }

    #[test]
    fn timeframe_parse_roundtrip() {
        for tf in [
            TimeFrame::M1,
            TimeFrame::M5,
            TimeFrame::M15,
            TimeFrame::M30,
            TimeFrame::H1,
            TimeFrame::H4,
            TimeFrame::D1,
        ] {
            assert_eq!(TimeFrame::from_str(tf.as_str()), Some(tf));
        }
    }
}
