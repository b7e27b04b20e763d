//! One polling iteration: fetch, normalize, diff and rank.

use chrono::Utc;
use tracing::{debug, info};

use cex_spread_core::{AppConfig, ExchangeRegistry, MarketType};

use crate::aggregator::TickerAggregator;
use crate::detector::{DetectorConfig, DiffEngine};
use crate::fees::{FeeSchedule, Ranker};
use crate::normalizer::PriceNormalizer;
use crate::resolver::ResolvedMarkets;
use crate::types::{ExchangeTables, FetchStats, IterationReport, MarketSnapshot};

/// Receives the report of every successful iteration.
pub trait OpportunitySink: Send + Sync {
    /// # Errors
    /// A failing sink fails the iteration, so the supervisor retries it.
    fn publish(&self, report: &IterationReport) -> anyhow::Result<()>;
}

/// Sink that only logs the top opportunity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl OpportunitySink for LogSink {
    fn publish(&self, report: &IterationReport) -> anyhow::Result<()> {
        match report.opportunities.first() {
            Some(best) => info!(
                base = %best.candidate.label(),
                buy = %best.candidate.buy_market,
                sell = %best.candidate.sell_market,
                spread_pct = %best.candidate.spread_pct.round_dp(4),
                net_pct = %best.net_profit_pct.round_dp(4),
                "best opportunity"
            ),
            None => info!(candidates = report.candidate_count, "no opportunities"),
        }
        Ok(())
    }
}

pub struct ScanPipeline {
    registry: ExchangeRegistry,
    markets: ResolvedMarkets,
    aggregator: TickerAggregator,
    normalizer: PriceNormalizer,
    engine: DiffEngine,
    ranker: Ranker,
}

impl std::fmt::Debug for ScanPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanPipeline")
            .field("exchanges", &self.registry.ids())
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

impl ScanPipeline {
    #[must_use]
    pub fn new(registry: ExchangeRegistry, markets: ResolvedMarkets, config: &AppConfig) -> Self {
        Self {
            registry,
            markets,
            aggregator: TickerAggregator::from_config(&config.scanner),
            normalizer: PriceNormalizer::new(config.scanner.quote_currency.clone()),
            engine: DiffEngine::new(DetectorConfig::from_scanner(&config.scanner)),
            ranker: Ranker::new(FeeSchedule::from_config(config), config.scanner.top_n),
        }
    }

    /// Fetches and normalizes every registered market, exchange by exchange.
    pub async fn collect_snapshot(&self) -> (MarketSnapshot, Vec<FetchStats>) {
        let mut snapshot = MarketSnapshot::new();
        let mut stats = Vec::new();

        for client in self.registry.iter() {
            let mut tables = ExchangeTables::new(client.id().clone());

            if let Some(resolved) = self.markets.get(client.id()) {
                for market_type in MarketType::ALL {
                    let symbols = resolved.symbols.get(market_type);
                    if symbols.is_empty() {
                        continue;
                    }
                    let outcome = self
                        .aggregator
                        .fetch(client.as_ref(), market_type, symbols)
                        .await;
                    let table = self
                        .normalizer
                        .normalize(client.as_ref(), &resolved.catalog, &outcome.tickers);
                    debug!(
                        market = %outcome.stats.market,
                        priced = table.len(),
                        "normalized tickers"
                    );
                    *tables.table_mut(market_type) = table;
                    stats.push(outcome.stats);
                }
            }

            snapshot.push(tables);
        }

        (snapshot, stats)
    }

    /// Runs one full iteration.
    ///
    /// # Errors
    /// Fails when a candidate market has no fee rate.
    pub async fn run_iteration(&self) -> anyhow::Result<IterationReport> {
        let (snapshot, fetch_stats) = self.collect_snapshot().await;
        for s in &fetch_stats {
            info!("{}", s);
        }

        let candidates = self.engine.detect(&snapshot);
        let candidate_count = candidates.len();
        let opportunities = self.ranker.rank(candidates, &snapshot)?;

        Ok(IterationReport {
            captured_at: Utc::now(),
            opportunities,
            fetch_stats,
            candidate_count,
        })
    }

    /// Runs one iteration and hands the report to `sink`.
    ///
    /// # Errors
    /// Propagates iteration and sink failures.
    pub async fn run_once(&self, sink: &dyn OpportunitySink) -> anyhow::Result<()> {
        let report = self.run_iteration().await?;
        sink.publish(&report)
    }
}
