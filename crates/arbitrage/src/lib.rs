//! Cross-exchange spot/perpetual spread detection.
//!
//! One polling iteration flows through these stages:
//!
//! 1. [`SymbolResolver`] picks the quote-currency symbols of each exchange (once, at startup)
//! 2. [`TickerAggregator`] fetches tickers in bounded-concurrency batches
//! 3. [`PriceNormalizer`] reduces tickers to base asset → [`Quote`] tables
//! 4. [`DiffEngine`] compares every market pair for every shared base asset
//! 5. [`Ranker`] applies the [`FeeSchedule`] and keeps the top N by gross spread
//!
//! [`ScanPipeline`] wires the stages together and [`Supervisor`] repeats the
//! iteration with bounded exponential backoff until shutdown.
//!
//! # Example
//!
//! ```ignore
//! use cex_spread_arbitrage::{RetryPolicy, ScanPipeline, Supervisor, SymbolResolver};
//!
//! let markets = SymbolResolver::new("USDT", None).load_all(&registry).await;
//! let pipeline = ScanPipeline::new(registry, markets, &config);
//! let mut supervisor = Supervisor::new(RetryPolicy::from_config(&config.supervisor), shutdown_rx);
//! supervisor.run(|| pipeline.run_once(&sink)).await;
//! ```

pub mod aggregator;
pub mod detector;
pub mod fees;
pub mod normalizer;
pub mod pair_watch;
pub mod pipeline;
pub mod resolver;
pub mod supervisor;
pub mod types;

pub use aggregator::{FetchOutcome, TickerAggregator};
pub use detector::{spread_pct, DetectorConfig, DiffEngine};
pub use fees::{FeeError, FeeSchedule, Ranker};
pub use normalizer::PriceNormalizer;
pub use pair_watch::{Direction, PairReading, PairWatch, PairWatchConfig, WatchedMarket};
pub use pipeline::{LogSink, OpportunitySink, ScanPipeline};
pub use resolver::{ResolvedExchange, ResolvedMarkets, SymbolResolver, SymbolSets};
pub use supervisor::{
    CycleOutcome, IterationOutcome, RetryPolicy, Supervisor, SupervisorState, Transition,
};
pub use types::{
    DiffCandidate, ExchangeTables, FetchStats, IterationReport, MarketSnapshot, PriceTable, Quote,
    RankedOpportunity,
};
