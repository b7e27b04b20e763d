//! Two-market spread watch.
//!
//! Polls the top of book of two configured markets and reports the spread in
//! both directions against a threshold.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use figment::providers::{Format, Toml};
use figment::Figment;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cex_spread_core::{ExchangeClient, ExchangeId, ExchangeRegistry, MarketType, TickerSnapshot};

use crate::detector::spread_pct;

// =============================================================================
// Configuration
// =============================================================================

/// Which side of the trade a market is on in the forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Buy leg.
    #[serde(rename = "+")]
    Buy,
    /// Sell leg.
    #[serde(rename = "-")]
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedMarket {
    pub exchange: ExchangeId,
    pub market_type: MarketType,
    /// Unified symbol, e.g. `BTC/USDT:USDT`.
    pub symbol: String,
    pub direction: Direction,
}

impl fmt::Display for WatchedMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.exchange, self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairWatchConfig {
    /// Alert threshold as a fraction; 0.002 alerts above 0.2 %.
    pub price_diff: Decimal,
    pub market1: WatchedMarket,
    pub market2: WatchedMarket,
}

impl PairWatchConfig {
    /// # Errors
    /// Returns error if the file cannot be parsed or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .with_context(|| format!("failed to load pair watch config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns error unless exactly one market is the buy leg.
    pub fn validate(&self) -> Result<()> {
        if self.market1.direction == self.market2.direction {
            bail!("pair watch needs one '+' market and one '-' market");
        }
        if self.price_diff.is_sign_negative() {
            bail!("price_diff must not be negative");
        }
        Ok(())
    }

    /// Threshold in percent.
    #[must_use]
    pub fn threshold_pct(&self) -> Decimal {
        self.price_diff * dec!(100)
    }

    /// (buy leg, sell leg) of the forward direction.
    #[must_use]
    pub fn legs(&self) -> (&WatchedMarket, &WatchedMarket) {
        match self.market1.direction {
            Direction::Buy => (&self.market1, &self.market2),
            Direction::Sell => (&self.market2, &self.market1),
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Spread of buying on one market and selling on the other.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalSpread {
    /// `+buy(symbol)-sell(symbol)`.
    pub label: String,
    /// `None` when either side of the book is empty.
    pub spread_pct: Option<Decimal>,
    pub alert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairReading {
    pub forward: DirectionalSpread,
    pub reverse: DirectionalSpread,
}

impl PairReading {
    #[must_use]
    pub fn alerts(&self) -> Vec<&DirectionalSpread> {
        [&self.forward, &self.reverse]
            .into_iter()
            .filter(|s| s.alert)
            .collect()
    }
}

fn directional(
    buy: &WatchedMarket,
    buy_ticker: &TickerSnapshot,
    sell: &WatchedMarket,
    sell_ticker: &TickerSnapshot,
    threshold_pct: Decimal,
) -> DirectionalSpread {
    let spread = match (buy_ticker.ask, sell_ticker.bid) {
        (Some(ask), Some(bid)) if !ask.is_zero() && !bid.is_zero() => spread_pct(ask, bid),
        _ => None,
    };
    DirectionalSpread {
        label: format!("+{buy}-{sell}"),
        alert: spread.is_some_and(|s| s > threshold_pct),
        spread_pct: spread,
    }
}

/// Computes both directions from the two markets' tickers.
#[must_use]
pub fn evaluate(config: &PairWatchConfig, ticker1: &TickerSnapshot, ticker2: &TickerSnapshot) -> PairReading {
    let threshold = config.threshold_pct();
    let (buy, sell) = config.legs();
    let (buy_ticker, sell_ticker) = match config.market1.direction {
        Direction::Buy => (ticker1, ticker2),
        Direction::Sell => (ticker2, ticker1),
    };

    PairReading {
        forward: directional(buy, buy_ticker, sell, sell_ticker, threshold),
        reverse: directional(sell, sell_ticker, buy, buy_ticker, threshold),
    }
}

// =============================================================================
// Watcher
// =============================================================================

pub struct PairWatch {
    config: PairWatchConfig,
    client1: Arc<dyn ExchangeClient>,
    client2: Arc<dyn ExchangeClient>,
}

impl fmt::Debug for PairWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairWatch").field("config", &self.config).finish()
    }
}

impl PairWatch {
    /// # Errors
    /// Returns error if either exchange is not in the registry.
    pub fn new(config: PairWatchConfig, registry: &ExchangeRegistry) -> Result<Self> {
        let lookup = |market: &WatchedMarket| {
            registry
                .get(&market.exchange)
                .cloned()
                .ok_or_else(|| anyhow!("exchange '{}' is not available", market.exchange))
        };
        let client1 = lookup(&config.market1)?;
        let client2 = lookup(&config.market2)?;
        Ok(Self {
            config,
            client1,
            client2,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PairWatchConfig {
        &self.config
    }

    /// Loads both catalogs and checks the watched symbols exist.
    ///
    /// # Errors
    /// Returns error if a catalog cannot be loaded or lacks its symbol.
    pub async fn prepare(&self) -> Result<()> {
        for (client, market) in [
            (&self.client1, &self.config.market1),
            (&self.client2, &self.config.market2),
        ] {
            let catalog = client
                .load_markets()
                .await
                .with_context(|| format!("failed to load markets for {}", market.exchange))?;
            let known = catalog
                .get(&market.symbol)
                .and_then(|m| m.market_type())
                .is_some_and(|mt| mt == market.market_type);
            if !known {
                bail!("{} has no {} market {}", market.exchange, market.market_type, market.symbol);
            }
        }
        info!(
            forward = %format!("+{}-{}", self.config.legs().0, self.config.legs().1),
            threshold_pct = %self.config.threshold_pct(),
            "pair watch ready"
        );
        Ok(())
    }

    /// Fetches both tickers, logs the spreads and warns above the threshold.
    ///
    /// # Errors
    /// Returns error if either ticker cannot be fetched.
    pub async fn poll(&self) -> Result<PairReading> {
        let (m1, m2) = (&self.config.market1, &self.config.market2);
        let ticker1 = self.client1.fetch_ticker(m1.market_type, &m1.symbol).await?;
        let ticker2 = self.client2.fetch_ticker(m2.market_type, &m2.symbol).await?;

        info!("{} {} - bid: {:?} | ask: {:?}", m1.exchange, m1.symbol, ticker1.bid, ticker1.ask);
        info!("{} {} - bid: {:?} | ask: {:?}", m2.exchange, m2.symbol, ticker2.bid, ticker2.ask);

        let reading = evaluate(&self.config, &ticker1, &ticker2);
        let threshold = self.config.threshold_pct();
        for (name, spread) in [("forward", &reading.forward), ("reverse", &reading.reverse)] {
            match spread.spread_pct {
                Some(pct) => info!(
                    "{} spread ({}): {}% (threshold {}%)",
                    name,
                    spread.label,
                    pct.round_dp(4),
                    threshold
                ),
                None => info!("{} spread ({}): unavailable", name, spread.label),
            }
        }
        for alert in reading.alerts() {
            if let Some(pct) = alert.spread_pct {
                warn!(
                    "spread opportunity {} at {}% exceeds threshold {}%",
                    alert.label,
                    pct.round_dp(4),
                    threshold
                );
            }
        }

        Ok(reading)
    }
}
