//! Cross-market spread detection.
//!
//! Compares every market of every exchange pair for each base asset priced
//! in both, and emits one [`DiffCandidate`] per buy/sell direction that
//! passes the validity, price and liquidity checks.

use cex_spread_core::{MarketId, MarketType, ScannerConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, trace};

use crate::types::{DiffCandidate, ExchangeTables, MarketSnapshot, Quote};

// =============================================================================
// Detection Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Spreads at or above this percentage are treated as bad data.
    pub max_spread_pct: Decimal,

    /// Minimum executable USDT value at the top of book; zero disables the check.
    pub min_tradeable_usdt: Decimal,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_spread_pct: dec!(100),
            min_tradeable_usdt: Decimal::ZERO,
        }
    }
}

impl DetectorConfig {
    #[must_use]
    pub fn from_scanner(config: &ScannerConfig) -> Self {
        Self {
            max_spread_pct: config.max_spread_pct,
            min_tradeable_usdt: config.min_tradeable_usdt,
        }
    }

    #[must_use]
    pub fn with_min_tradeable_usdt(mut self, value: Decimal) -> Self {
        self.min_tradeable_usdt = value;
        self
    }
}

/// Midpoint-normalized spread in percent between buying at `ask` and selling at `bid`.
///
/// Returns `None` when the midpoint is zero or the arithmetic overflows.
#[must_use]
pub fn spread_pct(ask: Decimal, bid: Decimal) -> Option<Decimal> {
    let mid = ask.checked_add(bid)? / dec!(2);
    if mid.is_zero() {
        return None;
    }
    bid.checked_sub(ask)?.checked_div(mid)?.checked_mul(dec!(100))
}

// =============================================================================
// Diff Engine
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    config: DetectorConfig,
}

/// One (market, price table) view of a base asset during a comparison.
struct View<'a> {
    market: MarketId,
    quote: Option<&'a Quote>,
}

impl DiffEngine {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Produces every candidate of one snapshot, in a deterministic order.
    #[must_use]
    pub fn detect(&self, snapshot: &MarketSnapshot) -> Vec<DiffCandidate> {
        let mut candidates = Vec::new();
        let mut seen: HashSet<(String, MarketId, MarketId)> = HashSet::new();

        let exchanges = &snapshot.exchanges;
        for i in 0..exchanges.len() {
            for j in i..exchanges.len() {
                self.compare_exchanges(&exchanges[i], &exchanges[j], &mut seen, &mut candidates);
            }
        }

        debug!(candidates = candidates.len(), "diff engine finished");
        candidates
    }

    fn compare_exchanges(
        &self,
        first: &ExchangeTables,
        second: &ExchangeTables,
        seen: &mut HashSet<(String, MarketId, MarketId)>,
        out: &mut Vec<DiffCandidate>,
    ) {
        let first_bases: BTreeSet<&String> = first.spot.keys().chain(first.perp.keys()).collect();
        let second_bases: BTreeSet<&String> = second.spot.keys().chain(second.perp.keys()).collect();

        for base in first_bases.intersection(&second_bases) {
            let views = [
                view(first, MarketType::Spot, base),
                view(first, MarketType::Perpetual, base),
                view(second, MarketType::Spot, base),
                view(second, MarketType::Perpetual, base),
            ];

            for (k, buy) in views.iter().enumerate() {
                for (l, sell) in views.iter().enumerate() {
                    if k == l {
                        continue;
                    }
                    let Some(candidate) = self.evaluate(base, buy, sell) else {
                        continue;
                    };
                    let key = (
                        candidate.base.clone(),
                        candidate.buy_market.clone(),
                        candidate.sell_market.clone(),
                    );
                    if seen.insert(key) {
                        out.push(candidate);
                    }
                }
            }
        }
    }

    fn evaluate(&self, base: &str, buy: &View<'_>, sell: &View<'_>) -> Option<DiffCandidate> {
        if buy.market == sell.market {
            return None;
        }
        if buy.market.is_perpetual() && !sell.market.is_perpetual() {
            return None;
        }

        let (buy_quote, sell_quote) = (buy.quote?, sell.quote?);

        let ask = buy_quote.ask.filter(|p| p.is_sign_positive() && !p.is_zero())?;
        let bid = sell_quote.bid.filter(|p| p.is_sign_positive() && !p.is_zero())?;

        let (Some(ask_volume), Some(bid_volume)) = (buy_quote.ask_volume, sell_quote.bid_volume) else {
            trace!(base, buy = %buy.market, sell = %sell.market, "skipping: unknown top-of-book size");
            return None;
        };

        let (Some(ask_notional), Some(bid_notional)) =
            (ask_volume.checked_mul(ask), bid_volume.checked_mul(bid))
        else {
            trace!(base, %ask, %ask_volume, %bid, %bid_volume, "skipping: top-of-book notional overflows");
            return None;
        };
        let tradeable_usdt = ask_notional.min(bid_notional);
        if self.config.min_tradeable_usdt > Decimal::ZERO
            && tradeable_usdt < self.config.min_tradeable_usdt
        {
            return None;
        }

        let Some(spread) = spread_pct(ask, bid) else {
            trace!(base, %ask, %bid, "skipping: spread undefined");
            return None;
        };
        if spread >= self.config.max_spread_pct {
            trace!(base, %spread, "skipping: spread above sanity bound");
            return None;
        }

        Some(DiffCandidate {
            base: base.to_string(),
            buy_market: buy.market.clone(),
            sell_market: sell.market.clone(),
            buy_symbol: buy_quote.symbol.clone(),
            sell_symbol: sell_quote.symbol.clone(),
            ask,
            bid,
            ask_volume,
            bid_volume,
            spread_pct: spread,
            tradeable_usdt,
            ordinal: None,
        })
    }
}

fn view<'a>(tables: &'a ExchangeTables, market_type: MarketType, base: &str) -> View<'a> {
    View {
        market: MarketId::new(tables.exchange.clone(), market_type),
        quote: tables.table(market_type).get(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cex_spread_core::ExchangeId;

    fn quote(symbol: &str, bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            price: (bid + ask) / dec!(2),
            symbol: symbol.to_string(),
            bid: Some(bid),
            ask: Some(ask),
            bid_volume: Some(dec!(10)),
            ask_volume: Some(dec!(10)),
            base_volume: None,
        }
    }

    fn market(exchange: &str, market_type: MarketType) -> MarketId {
        MarketId::new(ExchangeId::new(exchange), market_type)
    }

    fn snapshot() -> MarketSnapshot {
        let mut bybit = ExchangeTables::new(ExchangeId::new("bybit"));
        bybit
            .spot
            .insert("BTC".to_string(), quote("BTC/USDT", dec!(100), dec!(101)));
        let mut okx = ExchangeTables::new(ExchangeId::new("okx"));
        okx.perp
            .insert("BTC".to_string(), quote("BTC/USDT:USDT", dec!(103), dec!(104)));

        let mut snapshot = MarketSnapshot::new();
        snapshot.push(bybit);
        snapshot.push(okx);
        snapshot
    }

    #[test]
    fn test_spread_pct() {
        assert_eq!(spread_pct(dec!(100), dec!(102)).unwrap().round_dp(4), dec!(1.9802));
        assert!(spread_pct(dec!(0), dec!(0)).is_none());
        assert!(spread_pct(dec!(101), dec!(100)).unwrap() < Decimal::ZERO);
    }

    #[test]
    fn test_spread_pct_equal_prices_is_zero() {
        for price in [dec!(0.0001), dec!(1), dec!(65000.5)] {
            assert_eq!(spread_pct(price, price), Some(Decimal::ZERO));
        }
    }

    #[test]
    fn test_spread_pct_swap_flips_sign() {
        for (ask, bid) in [(dec!(100), dec!(102)), (dec!(0.5), dec!(0.49)), (dec!(3000), dec!(3100.25))] {
            let forward = spread_pct(ask, bid).unwrap();
            let reverse = spread_pct(bid, ask).unwrap();
            assert_eq!(forward, -reverse);
            assert_eq!(forward.abs(), reverse.abs());
        }
    }

    #[test]
    fn test_spread_pct_overflow_is_none() {
        assert!(spread_pct(Decimal::MAX, Decimal::MAX).is_none());
    }

    #[test]
    fn test_overflowing_notional_is_skipped() {
        let mut snapshot = snapshot();
        if let Some(q) = snapshot.exchanges[0].spot.get_mut("BTC") {
            q.ask = Some(dec!(100000000000000));
            q.bid = Some(dec!(100000000000000));
            q.ask_volume = Some(dec!(1000000000000000));
        }
        assert!(DiffEngine::default().detect(&snapshot).is_empty());
    }

    #[test]
    fn test_detect_spot_buy_perp_sell() {
        let candidates = DiffEngine::default().detect(&snapshot());

        // perp -> spot is never emitted
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.buy_market, market("bybit", MarketType::Spot));
        assert_eq!(c.sell_market, market("okx", MarketType::Perpetual));
        assert_eq!(c.ask, dec!(101));
        assert_eq!(c.bid, dec!(103));
        assert_eq!(c.tradeable_usdt, dec!(1010));
        assert_eq!(c.buy_symbol, "BTC/USDT");
        assert_eq!(c.sell_symbol, "BTC/USDT:USDT");
    }

    #[test]
    fn test_every_candidate_has_distinct_markets() {
        let mut snapshot = snapshot();
        snapshot.exchanges[0]
            .perp
            .insert("BTC".to_string(), quote("BTC/USDT:USDT", dec!(99), dec!(100)));
        snapshot.exchanges[1]
            .spot
            .insert("BTC".to_string(), quote("BTC/USDT", dec!(102), dec!(103)));

        let candidates = DiffEngine::default().detect(&snapshot);
        assert!(!candidates.is_empty());
        for c in &candidates {
            assert_ne!(c.buy_market, c.sell_market);
            assert!(!(c.buy_market.is_perpetual() && !c.sell_market.is_perpetual()));
        }
    }

    #[test]
    fn test_unknown_volume_is_skipped() {
        let mut snapshot = snapshot();
        if let Some(q) = snapshot.exchanges[1].perp.get_mut("BTC") {
            q.bid_volume = None;
        }
        assert!(DiffEngine::default().detect(&snapshot).is_empty());
    }

    #[test]
    fn test_non_positive_prices_rejected() {
        let mut snapshot = snapshot();
        if let Some(q) = snapshot.exchanges[0].spot.get_mut("BTC") {
            q.ask = Some(Decimal::ZERO);
        }
        assert!(DiffEngine::default().detect(&snapshot).is_empty());
    }

    #[test]
    fn test_min_tradeable_filter() {
        let engine = DiffEngine::new(DetectorConfig::default().with_min_tradeable_usdt(dec!(2000)));
        assert!(engine.detect(&snapshot()).is_empty());

        let engine = DiffEngine::new(DetectorConfig::default().with_min_tradeable_usdt(dec!(500)));
        assert_eq!(engine.detect(&snapshot()).len(), 1);
    }

    #[test]
    fn test_sanity_bound_rejects_absurd_spread() {
        let mut snapshot = snapshot();
        if let Some(q) = snapshot.exchanges[1].perp.get_mut("BTC") {
            q.bid = Some(dec!(1000));
        }
        assert!(DiffEngine::default().detect(&snapshot).is_empty());
    }

    #[test]
    fn test_negative_spreads_are_kept() {
        let mut snapshot = snapshot();
        if let Some(q) = snapshot.exchanges[1].perp.get_mut("BTC") {
            q.bid = Some(dec!(95));
        }
        let candidates = DiffEngine::default().detect(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].spread_pct < Decimal::ZERO);
    }

    #[test]
    fn test_same_exchange_spot_perp_pair_is_emitted_once() {
        let mut bybit = ExchangeTables::new(ExchangeId::new("bybit"));
        bybit
            .spot
            .insert("ETH".to_string(), quote("ETH/USDT", dec!(10), dec!(11)));
        bybit
            .perp
            .insert("ETH".to_string(), quote("ETH/USDT:USDT", dec!(12), dec!(13)));
        let mut snapshot = MarketSnapshot::new();
        snapshot.push(bybit);

        let candidates = DiffEngine::default().detect(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].buy_market, market("bybit", MarketType::Spot));
        assert_eq!(candidates[0].sell_market, market("bybit", MarketType::Perpetual));
    }

    #[test]
    fn test_deterministic_output() {
        let mut snapshot = snapshot();
        for (base, bid) in [("ETH", dec!(10)), ("SOL", dec!(20)), ("XRP", dec!(30))] {
            snapshot.exchanges[0]
                .spot
                .insert(base.to_string(), quote("X/USDT", bid, bid + dec!(1)));
            snapshot.exchanges[1]
                .perp
                .insert(base.to_string(), quote("X/USDT:USDT", bid + dec!(2), bid + dec!(3)));
        }
        let engine = DiffEngine::default();
        assert_eq!(engine.detect(&snapshot), engine.detect(&snapshot.clone()));
    }
}
