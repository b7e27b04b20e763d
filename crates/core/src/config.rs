use crate::types::{ExchangeId, MarketId, MarketType};
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Exchanges polled when the config does not name any.
pub const DEFAULT_EXCHANGES: [&str; 5] = ["bybit", "bitget", "binance", "okx", "gate"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Exchange ids in polling order.
    pub exchanges: Vec<String>,
    /// Plain-text allow-list of base assets, one per line.
    pub coins_file: String,
    pub scanner: ScannerConfig,
    pub supervisor: SupervisorConfig,
    pub network: NetworkConfig,
    /// Taker fee rates keyed by exchange id.
    pub fees: BTreeMap<String, MarketFees>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub quote_currency: String,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub request_timeout_secs: u64,
    pub top_n: usize,
    /// Spreads at or above this percentage are treated as malformed quotes.
    pub max_spread_pct: Decimal,
    /// Minimum executable top-of-book value in USDT; zero disables the filter.
    pub min_tradeable_usdt: Decimal,
    /// Per-exchange request rate limit.
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP(S) proxy applied to every exchange client.
    pub proxy: Option<String>,
    pub accept_invalid_certs: bool,
}

/// Taker fee rates of one exchange, as fractions (0.001 = 0.1%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketFees {
    pub spot: Decimal,
    pub perp: Decimal,
}

impl MarketFees {
    #[must_use]
    pub fn rate(&self, market_type: MarketType) -> Decimal {
        match market_type {
            MarketType::Spot => self.spot,
            MarketType::Perpetual => self.perp,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            quote_currency: "USDT".to_string(),
            batch_size: 200,
            max_concurrent_batches: 20,
            request_timeout_secs: 10,
            top_n: 10,
            max_spread_pct: dec!(100),
            min_tradeable_usdt: Decimal::ZERO,
            requests_per_second: 10,
        }
    }
}

impl ScannerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1000,
            poll_interval_ms: 1000,
        }
    }
}

impl SupervisorConfig {
    #[must_use]
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Default taker schedule: list rate times the share kept after rebates.
fn default_fees() -> BTreeMap<String, MarketFees> {
    let entries = [
        ("bybit", dec!(0.001) * dec!(0.67), dec!(0.00055) * dec!(0.67)),
        ("bitget", dec!(0.001) * dec!(0.5), dec!(0.0006) * dec!(0.5)),
        ("binance", dec!(0.001) * dec!(0.8), dec!(0.0005) * dec!(0.8)),
        ("okx", dec!(0.001) * dec!(0.8), dec!(0.0005) * dec!(0.8)),
        ("gate", dec!(0.001) * dec!(0.5), dec!(0.0005) * dec!(0.4)),
    ];
    entries
        .into_iter()
        .map(|(id, spot, perp)| (id.to_string(), MarketFees { spot, perp }))
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchanges: DEFAULT_EXCHANGES.iter().map(ToString::to_string).collect(),
            coins_file: "config/coins.txt".to_string(),
            scanner: ScannerConfig::default(),
            supervisor: SupervisorConfig::default(),
            network: NetworkConfig::default(),
            fees: default_fees(),
        }
    }
}

impl AppConfig {
    /// Configured exchange ids, normalized, in polling order.
    #[must_use]
    pub fn exchange_ids(&self) -> Vec<ExchangeId> {
        self.exchanges.iter().map(ExchangeId::new).collect()
    }

    /// Taker fee rate of a market, if configured.
    #[must_use]
    pub fn fee_rate(&self, market: &MarketId) -> Option<Decimal> {
        self.fees
            .get(market.exchange.as_str())
            .map(|fees| fees.rate(market.market_type))
    }

    /// Rejects configurations the scanner cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.exchanges.is_empty() {
            bail!("at least one exchange must be configured");
        }
        if self.scanner.batch_size == 0 {
            bail!("scanner.batch_size must be greater than zero");
        }
        if self.scanner.max_concurrent_batches == 0 {
            bail!("scanner.max_concurrent_batches must be greater than zero");
        }
        if self.scanner.top_n == 0 {
            bail!("scanner.top_n must be greater than zero");
        }
        if self.scanner.requests_per_second == 0 {
            bail!("scanner.requests_per_second must be greater than zero");
        }
        if self.scanner.quote_currency.trim().is_empty() {
            bail!("scanner.quote_currency must not be empty");
        }
        for id in self.exchange_ids() {
            if !self.fees.contains_key(id.as_str()) {
                bail!("no fee schedule configured for exchange '{id}'");
            }
        }
        Ok(())
    }
}
