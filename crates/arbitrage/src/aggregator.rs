//! Batched, concurrent ticker fetching for one market.

use crate::types::FetchStats;
use cex_spread_core::{ExchangeClient, MarketId, MarketType, ScannerConfig, TickerSnapshot};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tickers of one market plus how the fetch went.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub tickers: HashMap<String, TickerSnapshot>,
    pub stats: FetchStats,
}

/// Splits a symbol set into batches and fetches them with bounded concurrency.
///
/// A failing or timed-out batch only loses its own symbols.
#[derive(Debug, Clone)]
pub struct TickerAggregator {
    batch_size: usize,
    max_concurrent_batches: usize,
    request_timeout: Duration,
}

impl TickerAggregator {
    #[must_use]
    pub fn new(batch_size: usize, max_concurrent_batches: usize, request_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_concurrent_batches: max_concurrent_batches.max(1),
            request_timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(
            config.batch_size,
            config.max_concurrent_batches,
            config.request_timeout(),
        )
    }

    pub async fn fetch(
        &self,
        client: &dyn ExchangeClient,
        market_type: MarketType,
        symbols: &[String],
    ) -> FetchOutcome {
        let started = Instant::now();
        let market = MarketId::new(client.id().clone(), market_type);

        let batches: Vec<&[String]> = symbols.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        let results: Vec<Option<HashMap<String, TickerSnapshot>>> = stream::iter(batches)
            .map(|batch| self.fetch_batch(client, &market, batch))
            .buffer_unordered(self.max_concurrent_batches)
            .collect()
            .await;

        let mut tickers = HashMap::with_capacity(symbols.len());
        let mut failed_batches = 0;
        for result in results {
            match result {
                Some(batch) => tickers.extend(batch),
                None => failed_batches += 1,
            }
        }

        let stats = FetchStats {
            market,
            requested: symbols.len(),
            received: tickers.len(),
            batches: batch_count,
            failed_batches,
            elapsed: started.elapsed(),
        };
        debug!("{}", stats);

        FetchOutcome { tickers, stats }
    }

    async fn fetch_batch(
        &self,
        client: &dyn ExchangeClient,
        market: &MarketId,
        batch: &[String],
    ) -> Option<HashMap<String, TickerSnapshot>> {
        let request = async {
            if let [symbol] = batch {
                let ticker = client.fetch_ticker(market.market_type, symbol).await?;
                Ok::<_, anyhow::Error>(HashMap::from([(symbol.clone(), ticker)]))
            } else {
                client.fetch_tickers(market.market_type, batch).await
            }
        };

        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(tickers)) => Some(tickers),
            Ok(Err(e)) => {
                warn!(market = %market, symbols = batch.len(), "batch fetch failed: {:#}", e);
                None
            }
            Err(_) => {
                warn!(
                    market = %market,
                    symbols = batch.len(),
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "batch fetch timed out"
                );
                None
            }
        }
    }
}
