//! Binance public market data.
//!
//! Spot is served from `api.binance.com/api/v3`, USDⓈ-M perpetuals from
//! `fapi.binance.com/fapi/v1`. The futures 24h ticker carries no book, so
//! bulk perpetual snapshots merge it with `bookTicker`.

use crate::error::{ExchangeError, Result};
use crate::http::{ClientSettings, RestClient};
use crate::market_index::MarketIndex;
use async_trait::async_trait;
use cex_spread_core::{
    decimal_from_json, ExchangeClient, ExchangeId, MarketCatalog, MarketInfo, MarketType,
    TickerSnapshot,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

pub const BINANCE_SPOT_URL: &str = "https://api.binance.com";
pub const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";

const BOOK_FIELDS: [&str; 4] = ["bidPrice", "bidQty", "askPrice", "askQty"];

#[derive(Debug, Deserialize)]
struct RawExchangeInfo {
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSymbol {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    margin_asset: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
}

fn parse_ticker(symbol: &str, item: serde_json::Value) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.to_string(),
        last: decimal_from_json(&item["lastPrice"]),
        bid: decimal_from_json(&item["bidPrice"]),
        ask: decimal_from_json(&item["askPrice"]),
        bid_volume: decimal_from_json(&item["bidQty"]),
        ask_volume: decimal_from_json(&item["askQty"]),
        base_volume: decimal_from_json(&item["volume"]),
        timestamp: Utc::now(),
        info: item,
    }
}

/// Copies the book fields of `book` into `stats`.
fn merge_book(stats: &mut serde_json::Value, book: &serde_json::Value) {
    if let Some(stats) = stats.as_object_mut() {
        for field in BOOK_FIELDS {
            if let Some(value) = book.get(field) {
                stats.insert(field.to_string(), value.clone());
            }
        }
    }
}

pub struct BinanceClient {
    id: ExchangeId,
    spot: RestClient,
    futures: RestClient,
    markets: MarketIndex,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("spot_url", &self.spot.base_url())
            .field("futures_url", &self.futures.base_url())
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        Self::with_base_urls(BINANCE_SPOT_URL, BINANCE_FUTURES_URL, settings)
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_urls(
        spot_url: impl Into<String>,
        futures_url: impl Into<String>,
        settings: &ClientSettings,
    ) -> Result<Self> {
        let id = ExchangeId::new("binance");
        let spot = RestClient::new(spot_url, settings)?;
        let futures = spot.with_base_url(futures_url);
        Ok(Self {
            spot,
            futures,
            markets: MarketIndex::new(id.clone()),
            id,
        })
    }

    async fn spot_tickers(&self, native_ids: &[String]) -> Result<Vec<serde_json::Value>> {
        if native_ids.is_empty() {
            return Ok(Vec::new());
        }
        let symbols = serde_json::to_string(native_ids)?;
        self.spot
            .get("/api/v3/ticker/24hr", &[("symbols", symbols.as_str())])
            .await
    }

    async fn perpetual_tickers(&self) -> Result<Vec<serde_json::Value>> {
        let mut stats: Vec<serde_json::Value> = self.futures.get("/fapi/v1/ticker/24hr", &[]).await?;
        let books: Vec<serde_json::Value> =
            self.futures.get("/fapi/v1/ticker/bookTicker", &[]).await?;

        let books: HashMap<&str, &serde_json::Value> = books
            .iter()
            .filter_map(|b| b.get("symbol").and_then(|s| s.as_str()).map(|s| (s, b)))
            .collect();

        for item in &mut stats {
            let symbol = item
                .get("symbol")
                .and_then(|s| s.as_str())
                .map(ToString::to_string);
            if let Some(book) = symbol.as_deref().and_then(|s| books.get(s)) {
                merge_book(item, book);
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn load_markets(&self) -> anyhow::Result<MarketCatalog> {
        let mut catalog = MarketCatalog::new();

        let spot: RawExchangeInfo = self.spot.get("/api/v3/exchangeInfo", &[]).await?;
        for raw in spot.symbols {
            if raw.status == "TRADING" {
                catalog.insert(MarketInfo::spot(raw.symbol, &raw.base_asset, &raw.quote_asset));
            }
        }

        let futures: RawExchangeInfo = self.futures.get("/fapi/v1/exchangeInfo", &[]).await?;
        for raw in futures.symbols {
            if raw.status == "TRADING" && raw.contract_type.as_deref() == Some("PERPETUAL") {
                let settle = raw.margin_asset.as_deref().unwrap_or(&raw.quote_asset).to_string();
                catalog.insert(MarketInfo::perpetual(
                    raw.symbol,
                    &raw.base_asset,
                    &raw.quote_asset,
                    &settle,
                ));
            }
        }

        self.markets.store(&catalog);
        tracing::debug!(exchange = %self.id, markets = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    async fn fetch_tickers(
        &self,
        market_type: MarketType,
        symbols: &[String],
    ) -> anyhow::Result<HashMap<String, TickerSnapshot>> {
        let items = match market_type {
            MarketType::Spot => {
                let native_ids = self.markets.native_ids(symbols)?;
                self.spot_tickers(&native_ids).await?
            }
            MarketType::Perpetual => {
                self.markets.ensure_loaded()?;
                self.perpetual_tickers().await?
            }
        };
        Ok(self
            .markets
            .select(market_type, symbols, items, "symbol", parse_ticker)?)
    }

    async fn fetch_ticker(&self, market_type: MarketType, symbol: &str) -> anyhow::Result<TickerSnapshot> {
        let native = self.markets.native_id(symbol)?;
        let query = [("symbol", native.as_str())];

        let item: serde_json::Value = match market_type {
            MarketType::Spot => self.spot.get("/api/v3/ticker/24hr", &query).await?,
            MarketType::Perpetual => {
                let mut stats: serde_json::Value =
                    self.futures.get("/fapi/v1/ticker/24hr", &query).await?;
                let book: serde_json::Value =
                    self.futures.get("/fapi/v1/ticker/bookTicker", &query).await?;
                merge_book(&mut stats, &book);
                stats
            }
        };

        if !item.is_object() {
            return Err(ExchangeError::Decode(format!("unexpected ticker payload for {symbol}")).into());
        }
        Ok(parse_ticker(symbol, item))
    }
}
