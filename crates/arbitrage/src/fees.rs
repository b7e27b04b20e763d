//! Fee schedule and fee-adjusted ranking of spread candidates.

use std::collections::{BTreeMap, HashMap};

use cex_spread_core::{AppConfig, ExchangeId, MarketId, MarketType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::debug;

use crate::types::{DiffCandidate, MarketSnapshot, Quote, RankedOpportunity};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("no fee rate configured for market {0}")]
    UnknownMarket(MarketId),

    /// The ranked candidate's leg has no quote in the snapshot it came from.
    #[error("no {1} quote for market {0}")]
    MissingQuote(MarketId, String),
}

// =============================================================================
// Fee Schedule
// =============================================================================

/// Taker fee rate per market.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    rates: BTreeMap<MarketId, Decimal>,
}

impl FeeSchedule {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let rates = config
            .fees
            .iter()
            .flat_map(|(exchange, fees)| {
                let id = ExchangeId::new(exchange);
                MarketType::ALL
                    .into_iter()
                    .map(move |mt| (MarketId::new(id.clone(), mt), fees.rate(mt)))
            })
            .collect();
        Self { rates }
    }

    #[must_use]
    pub fn from_rates(rates: impl IntoIterator<Item = (MarketId, Decimal)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
        }
    }

    /// # Errors
    /// Returns [`FeeError::UnknownMarket`] if the market has no configured rate.
    pub fn rate(&self, market: &MarketId) -> Result<Decimal, FeeError> {
        self.rates
            .get(market)
            .copied()
            .ok_or_else(|| FeeError::UnknownMarket(market.clone()))
    }

    /// Round-trip fees of buying on `buy` and selling on `sell`, in percent.
    ///
    /// Any leg on a perpetual doubles the combined rate. Two spot legs pay
    /// the sell market's rate twice more for the transfer back.
    ///
    /// # Errors
    /// Returns [`FeeError::UnknownMarket`] if either market has no configured rate.
    pub fn total_fees_pct(&self, buy: &MarketId, sell: &MarketId) -> Result<Decimal, FeeError> {
        let buy_rate = self.rate(buy)?;
        let sell_rate = self.rate(sell)?;

        let total = if buy.is_perpetual() || sell.is_perpetual() {
            (buy_rate + sell_rate) * dec!(2)
        } else {
            buy_rate + sell_rate + sell_rate * dec!(2)
        };
        Ok(total * dec!(100))
    }
}

// =============================================================================
// Ranker
// =============================================================================

/// Sorts candidates by gross spread, keeps the top N and applies fees.
#[derive(Debug, Clone)]
pub struct Ranker {
    fees: FeeSchedule,
    top_n: usize,
}

impl Ranker {
    #[must_use]
    pub fn new(fees: FeeSchedule, top_n: usize) -> Self {
        Self { fees, top_n }
    }

    #[must_use]
    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// # Errors
    /// Fails if any candidate references a market without a fee rate, even
    /// one that would not make the top N.
    pub fn rank(
        &self,
        candidates: Vec<DiffCandidate>,
        snapshot: &MarketSnapshot,
    ) -> Result<Vec<RankedOpportunity>, FeeError> {
        let mut priced = Vec::with_capacity(candidates.len());
        for c in candidates {
            let fees = self.fees.total_fees_pct(&c.buy_market, &c.sell_market)?;
            priced.push((c, fees));
        }

        priced.sort_by(|(a, _), (b, _)| b.spread_pct.cmp(&a.spread_pct));
        priced.truncate(self.top_n);

        let mut repeats: HashMap<String, u32> = HashMap::new();
        let mut ranked = Vec::with_capacity(priced.len());
        for (mut candidate, total_fees_pct) in priced {
            let seen = repeats.entry(candidate.base.clone()).or_insert(0);
            if *seen > 0 {
                candidate.ordinal = Some(*seen);
            }
            *seen += 1;

            let buy_quote = leg_quote(snapshot, &candidate.buy_market, &candidate.base)?;
            let sell_quote = leg_quote(snapshot, &candidate.sell_market, &candidate.base)?;

            ranked.push(RankedOpportunity {
                net_profit_pct: candidate.spread_pct - total_fees_pct,
                total_fees_pct,
                candidate,
                buy_quote,
                sell_quote,
            });
        }

        debug!(ranked = ranked.len(), "ranking finished");
        Ok(ranked)
    }
}

fn leg_quote(snapshot: &MarketSnapshot, market: &MarketId, base: &str) -> Result<Quote, FeeError> {
    snapshot
        .quote(market, base)
        .cloned()
        .ok_or_else(|| FeeError::MissingQuote(market.clone(), base.to_string()))
}
