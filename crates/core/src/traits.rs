use crate::types::{ExchangeId, MarketCatalog, MarketType, TickerSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Capability interface every exchange adapter implements.
///
/// Symbols passed in and returned are unified symbols from the adapter's own
/// [`MarketCatalog`].
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Identifier this client is registered under.
    fn id(&self) -> &ExchangeId;

    /// Loads the full market catalog (spot and perpetual).
    async fn load_markets(&self) -> Result<MarketCatalog>;

    /// Fetches snapshots for many symbols of one market type in one request.
    ///
    /// Symbols the exchange did not return are simply absent from the map.
    async fn fetch_tickers(
        &self,
        market_type: MarketType,
        symbols: &[String],
    ) -> Result<HashMap<String, TickerSnapshot>>;

    /// Fetches the snapshot of a single symbol.
    async fn fetch_ticker(&self, market_type: MarketType, symbol: &str) -> Result<TickerSnapshot>;

    /// Resting (bid, ask) sizes at the top of book, coerced to numbers.
    ///
    /// Adapters whose payload reports sizes outside the standard fields override this.
    /// Sizes are whatever unit the venue quotes: base units on spot books, but
    /// contracts on some perpetual books (OKX swaps), so `size * price` is only
    /// a USDT notional where one contract is one base unit.
    fn book_volumes(&self, ticker: &TickerSnapshot) -> (Option<Decimal>, Option<Decimal>) {
        (ticker.bid_volume, ticker.ask_volume)
    }
}
