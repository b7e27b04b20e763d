//! Shared types for cross-market spread detection.
//!
//! Everything here is rebuilt from scratch every polling iteration.

use cex_spread_core::{ExchangeId, MarketId, MarketType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// =============================================================================
// Normalized Prices
// =============================================================================

/// Normalized top-of-book snapshot of one market for one base asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Last traded price; always present.
    pub price: Decimal,
    /// Unified symbol the quote was read from.
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub bid_volume: Option<Decimal>,
    pub ask_volume: Option<Decimal>,
    pub base_volume: Option<Decimal>,
}

/// Base asset → quote for one (exchange, market type).
pub type PriceTable = BTreeMap<String, Quote>;

/// Spot and perpetual tables of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeTables {
    pub exchange: ExchangeId,
    pub spot: PriceTable,
    pub perp: PriceTable,
}

impl ExchangeTables {
    #[must_use]
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            spot: PriceTable::new(),
            perp: PriceTable::new(),
        }
    }

    #[must_use]
    pub fn table(&self, market_type: MarketType) -> &PriceTable {
        match market_type {
            MarketType::Spot => &self.spot,
            MarketType::Perpetual => &self.perp,
        }
    }

    pub fn table_mut(&mut self, market_type: MarketType) -> &mut PriceTable {
        match market_type {
            MarketType::Spot => &mut self.spot,
            MarketType::Perpetual => &mut self.perp,
        }
    }
}

/// Every price table of one iteration, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub exchanges: Vec<ExchangeTables>,
}

impl MarketSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tables: ExchangeTables) {
        self.exchanges.push(tables);
    }

    /// Quote of `base` in the given market, if that market priced it.
    #[must_use]
    pub fn quote(&self, market: &MarketId, base: &str) -> Option<&Quote> {
        self.exchanges
            .iter()
            .find(|t| t.exchange == market.exchange)
            .and_then(|t| t.table(market.market_type).get(base))
    }
}

// =============================================================================
// Candidates & Opportunities
// =============================================================================

/// One directional spread between two markets for one base asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffCandidate {
    pub base: String,
    pub buy_market: MarketId,
    pub sell_market: MarketId,
    pub buy_symbol: String,
    pub sell_symbol: String,
    /// Ask of the buy market.
    pub ask: Decimal,
    /// Bid of the sell market.
    pub bid: Decimal,
    pub ask_volume: Decimal,
    pub bid_volume: Decimal,
    /// Midpoint-normalized spread in percent; negative when the bid is below the ask.
    pub spread_pct: Decimal,
    /// USDT executable at the top of book on the thinner side.
    pub tradeable_usdt: Decimal,
    /// Repeat index of this base asset within a ranked list.
    pub ordinal: Option<u32>,
}

impl DiffCandidate {
    /// Display label: `BTC` for the first occurrence, `BTC(1)` for the first repeat.
    #[must_use]
    pub fn label(&self) -> String {
        match self.ordinal {
            Some(n) => format!("{}({n})", self.base),
            None => self.base.clone(),
        }
    }
}

/// Candidate with fees applied, as presented to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOpportunity {
    pub candidate: DiffCandidate,
    pub total_fees_pct: Decimal,
    pub net_profit_pct: Decimal,
    pub buy_quote: Quote,
    pub sell_quote: Quote,
}

impl RankedOpportunity {
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.net_profit_pct > Decimal::ZERO
    }
}

// =============================================================================
// Iteration Report
// =============================================================================

/// Outcome of fetching one symbol set from one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStats {
    pub market: MarketId,
    pub requested: usize,
    pub received: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub elapsed: Duration,
}

impl fmt::Display for FetchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} tickers, {} batches ({} failed) in {}ms",
            self.market,
            self.received,
            self.requested,
            self.batches,
            self.failed_batches,
            self.elapsed.as_millis()
        )
    }
}

/// Everything one successful iteration produced.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub captured_at: DateTime<Utc>,
    pub opportunities: Vec<RankedOpportunity>,
    pub fetch_stats: Vec<FetchStats>,
    pub candidate_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(price: Decimal) -> Quote {
        Quote {
            price,
            symbol: "BTC/USDT".to_string(),
            bid: None,
            ask: None,
            bid_volume: None,
            ask_volume: None,
            base_volume: None,
        }
    }

    #[test]
    fn test_label_with_ordinal() {
        let mut candidate = DiffCandidate {
            base: "ETH".to_string(),
            buy_market: MarketId::new(ExchangeId::new("okx"), MarketType::Spot),
            sell_market: MarketId::new(ExchangeId::new("gate"), MarketType::Perpetual),
            buy_symbol: "ETH/USDT".to_string(),
            sell_symbol: "ETH/USDT:USDT".to_string(),
            ask: dec!(100),
            bid: dec!(101),
            ask_volume: dec!(1),
            bid_volume: dec!(1),
            spread_pct: dec!(1),
            tradeable_usdt: dec!(100),
            ordinal: None,
        };
        assert_eq!(candidate.label(), "ETH");
        candidate.ordinal = Some(2);
        assert_eq!(candidate.label(), "ETH(2)");
    }

    #[test]
    fn test_snapshot_quote_lookup() {
        let mut tables = ExchangeTables::new(ExchangeId::new("bybit"));
        tables
            .table_mut(MarketType::Perpetual)
            .insert("BTC".to_string(), quote(dec!(50000)));

        let mut snapshot = MarketSnapshot::new();
        snapshot.push(tables);

        let perp = MarketId::new(ExchangeId::new("bybit"), MarketType::Perpetual);
        let spot = MarketId::new(ExchangeId::new("bybit"), MarketType::Spot);
        assert_eq!(snapshot.quote(&perp, "BTC").unwrap().price, dec!(50000));
        assert!(snapshot.quote(&spot, "BTC").is_none());
    }
}
