//! Exchange-agnostic market types shared by every crate in the workspace.
//!
//! Symbols follow the unified notation used across adapters:
//! `BTC/USDT` for spot and `BTC/USDT:USDT` for USDT-margined perpetuals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// Lowercase exchange identifier, e.g. `bybit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    /// Creates an identifier, normalizing to lowercase.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Market type of a trading pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    /// Immediate delivery.
    Spot,
    /// Perpetual swap contract.
    #[serde(alias = "perp", alias = "swap")]
    Perpetual,
}

impl MarketType {
    /// Both market types, spot first.
    pub const ALL: [MarketType; 2] = [MarketType::Spot, MarketType::Perpetual];

    /// Short label used in market ids (`spot` / `perp`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Perpetual => "perp",
        }
    }

    #[must_use]
    pub fn is_perpetual(self) -> bool {
        matches!(self, Self::Perpetual)
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tradable market on one exchange, displayed as `BYBIT:spot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId {
    pub exchange: ExchangeId,
    pub market_type: MarketType,
}

impl MarketId {
    #[must_use]
    pub fn new(exchange: ExchangeId, market_type: MarketType) -> Self {
        Self {
            exchange,
            market_type,
        }
    }

    #[must_use]
    pub fn is_perpetual(&self) -> bool {
        self.market_type.is_perpetual()
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.exchange.as_str().to_ascii_uppercase(),
            self.market_type
        )
    }
}

// =============================================================================
// Market Catalog
// =============================================================================

/// A single catalog entry as reported by an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Unified symbol (`BTC/USDT`, `BTC/USDT:USDT`).
    pub symbol: String,
    /// Exchange-native instrument id (`BTCUSDT`, `BTC-USDT-SWAP`, `BTC_USDT`).
    pub id: String,
    pub base: String,
    pub quote: String,
    pub spot: bool,
    pub swap: bool,
}

impl MarketInfo {
    /// Builds a spot entry with the unified symbol `BASE/QUOTE`.
    #[must_use]
    pub fn spot(id: impl Into<String>, base: &str, quote: &str) -> Self {
        let base = base.to_ascii_uppercase();
        let quote = quote.to_ascii_uppercase();
        Self {
            symbol: format!("{base}/{quote}"),
            id: id.into(),
            base,
            quote,
            spot: true,
            swap: false,
        }
    }

    /// Builds a linear perpetual entry with the unified symbol `BASE/QUOTE:SETTLE`.
    #[must_use]
    pub fn perpetual(id: impl Into<String>, base: &str, quote: &str, settle: &str) -> Self {
        let base = base.to_ascii_uppercase();
        let quote = quote.to_ascii_uppercase();
        Self {
            symbol: format!("{base}/{quote}:{}", settle.to_ascii_uppercase()),
            id: id.into(),
            base,
            quote,
            spot: false,
            swap: true,
        }
    }

    /// Returns the market type this entry belongs to, if it is spot or swap.
    #[must_use]
    pub fn market_type(&self) -> Option<MarketType> {
        match (self.spot, self.swap) {
            (true, _) => Some(MarketType::Spot),
            (false, true) => Some(MarketType::Perpetual),
            (false, false) => None,
        }
    }
}

/// All markets of one exchange, keyed by unified symbol.
///
/// Ordered so symbol lists derived from it are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCatalog {
    markets: BTreeMap<String, MarketInfo>,
}

impl MarketCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any previous entry with the same symbol.
    pub fn insert(&mut self, info: MarketInfo) {
        self.markets.insert(info.symbol.clone(), info);
    }

    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&MarketInfo> {
        self.markets.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketInfo> {
        self.markets.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

impl Extend<MarketInfo> for MarketCatalog {
    fn extend<I: IntoIterator<Item = MarketInfo>>(&mut self, iter: I) {
        for info in iter {
            self.insert(info);
        }
    }
}

impl FromIterator<MarketInfo> for MarketCatalog {
    fn from_iter<I: IntoIterator<Item = MarketInfo>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for info in iter {
            catalog.insert(info);
        }
        catalog
    }
}

// =============================================================================
// Ticker Snapshot
// =============================================================================

/// Top-of-book snapshot for one symbol at one point in time.
///
/// Every numeric field is optional: `None` means the exchange did not report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    /// Unified symbol.
    pub symbol: String,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub bid_volume: Option<Decimal>,
    pub ask_volume: Option<Decimal>,
    /// 24h volume in base currency.
    pub base_volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    /// Raw exchange payload the snapshot was parsed from.
    #[serde(default)]
    pub info: serde_json::Value,
}

impl TickerSnapshot {
    /// Creates an empty snapshot for a symbol, stamped now.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            last: None,
            bid: None,
            ask: None,
            bid_volume: None,
            ask_volume: None,
            base_volume: None,
            timestamp: Utc::now(),
            info: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_last(mut self, last: Decimal) -> Self {
        self.last = Some(last);
        self
    }

    /// Sets bid price and resting bid size.
    #[must_use]
    pub fn with_bid(mut self, price: Decimal, volume: Option<Decimal>) -> Self {
        self.bid = Some(price);
        self.bid_volume = volume;
        self
    }

    /// Sets ask price and resting ask size.
    #[must_use]
    pub fn with_ask(mut self, price: Decimal, volume: Option<Decimal>) -> Self {
        self.ask = Some(price);
        self.ask_volume = volume;
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: serde_json::Value) -> Self {
        self.info = info;
        self
    }
}

/// Parses an optional decimal from a JSON value that may be a string or a number.
///
/// Exchanges disagree on whether numbers are quoted; empty strings count as absent.
#[must_use]
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_market_id_display() {
        let spot = MarketId::new(ExchangeId::new("bybit"), MarketType::Spot);
        let perp = MarketId::new(ExchangeId::new("Gate"), MarketType::Perpetual);
        assert_eq!(spot.to_string(), "BYBIT:spot");
        assert_eq!(perp.to_string(), "GATE:perp");
        assert!(perp.is_perpetual());
    }

    #[test]
    fn test_exchange_id_normalizes_case() {
        assert_eq!(ExchangeId::new(" OKX "), ExchangeId::from("okx"));
    }

    #[test]
    fn test_market_info_unified_symbols() {
        let spot = MarketInfo::spot("BTCUSDT", "btc", "usdt");
        assert_eq!(spot.symbol, "BTC/USDT");
        assert_eq!(spot.market_type(), Some(MarketType::Spot));

        let perp = MarketInfo::perpetual("BTC-USDT-SWAP", "BTC", "USDT", "USDT");
        assert_eq!(perp.symbol, "BTC/USDT:USDT");
        assert_eq!(perp.market_type(), Some(MarketType::Perpetual));
    }

    #[test]
    fn test_catalog_keyed_by_unified_symbol() {
        let catalog: MarketCatalog = vec![
            MarketInfo::spot("BTCUSDT", "BTC", "USDT"),
            MarketInfo::perpetual("BTCUSDT", "BTC", "USDT", "USDT"),
        ]
        .into_iter()
        .collect();

        assert_eq!(catalog.len(), 2);
        let perp = catalog.get("BTC/USDT:USDT").unwrap();
        assert_eq!(perp.market_type(), Some(MarketType::Perpetual));
        assert_eq!(perp.id, "BTCUSDT");
        assert!(catalog.get("ETH/USDT").is_none());
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&json!("101.5")), Some(dec!(101.5)));
        assert_eq!(decimal_from_json(&json!(42)), Some(dec!(42)));
        assert_eq!(decimal_from_json(&json!("")), None);
        assert_eq!(decimal_from_json(&json!(null)), None);
        assert_eq!(decimal_from_json(&json!("abc")), None);
    }

    #[test]
    fn test_market_type_deserializes_aliases() {
        let parsed: MarketType = serde_json::from_str("\"swap\"").unwrap();
        assert_eq!(parsed, MarketType::Perpetual);
        let parsed: MarketType = serde_json::from_str("\"spot\"").unwrap();
        assert_eq!(parsed, MarketType::Spot);
    }
}
