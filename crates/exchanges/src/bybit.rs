//! Bybit v5 public market data.
//!
//! Spot lives under `category=spot`, USDT perpetuals under `category=linear`.

use crate::error::{ExchangeError, Result};
use crate::http::{ClientSettings, RestClient};
use crate::market_index::MarketIndex;
use async_trait::async_trait;
use cex_spread_core::{
    decimal_from_json, ExchangeClient, ExchangeId, MarketCatalog, MarketInfo, MarketType,
    TickerSnapshot,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

pub const BYBIT_API_URL: &str = "https://api.bybit.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct ListResult<T> {
    #[serde(default)]
    list: Vec<T>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstrument {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    settle_coin: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
}

fn category(market_type: MarketType) -> &'static str {
    match market_type {
        MarketType::Spot => "spot",
        MarketType::Perpetual => "linear",
    }
}

fn parse_ticker(symbol: &str, item: serde_json::Value) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.to_string(),
        last: decimal_from_json(&item["lastPrice"]),
        bid: decimal_from_json(&item["bid1Price"]),
        ask: decimal_from_json(&item["ask1Price"]),
        bid_volume: decimal_from_json(&item["bid1Size"]),
        ask_volume: decimal_from_json(&item["ask1Size"]),
        base_volume: decimal_from_json(&item["volume24h"]),
        timestamp: Utc::now(),
        info: item,
    }
}

pub struct BybitClient {
    id: ExchangeId,
    rest: RestClient,
    markets: MarketIndex,
}

impl std::fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClient")
            .field("base_url", &self.rest.base_url())
            .finish_non_exhaustive()
    }
}

impl BybitClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        Self::with_base_url(BYBIT_API_URL, settings)
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: impl Into<String>, settings: &ClientSettings) -> Result<Self> {
        let id = ExchangeId::new("bybit");
        Ok(Self {
            rest: RestClient::new(base_url, settings)?,
            markets: MarketIndex::new(id.clone()),
            id,
        })
    }

    async fn get_result<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let envelope: Envelope<T> = self.rest.get(path, query).await?;
        if envelope.ret_code != 0 {
            return Err(ExchangeError::rejected(
                envelope.ret_code.to_string(),
                envelope.ret_msg,
            ));
        }
        envelope
            .result
            .ok_or_else(|| ExchangeError::Decode(format!("{path}: missing result")))
    }

    async fn instruments(&self, market_type: MarketType) -> Result<Vec<RawInstrument>> {
        let mut instruments = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("category", category(market_type)), ("limit", "1000")];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let page: ListResult<RawInstrument> =
                self.get_result("/v5/market/instruments-info", &query).await?;
            instruments.extend(page.list);

            match page.next_page_cursor {
                Some(next) if !next.is_empty() && next != cursor => cursor = next,
                _ => break,
            }
        }
        Ok(instruments)
    }

    async fn tickers(&self, market_type: MarketType, symbol: Option<&str>) -> Result<Vec<serde_json::Value>> {
        let mut query = vec![("category", category(market_type))];
        if let Some(symbol) = symbol {
            query.push(("symbol", symbol));
        }
        let page: ListResult<serde_json::Value> =
            self.get_result("/v5/market/tickers", &query).await?;
        Ok(page.list)
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn load_markets(&self) -> anyhow::Result<MarketCatalog> {
        let mut catalog = MarketCatalog::new();

        for raw in self.instruments(MarketType::Spot).await? {
            if raw.status.as_deref() == Some("Trading") {
                catalog.insert(MarketInfo::spot(raw.symbol, &raw.base_coin, &raw.quote_coin));
            }
        }
        for raw in self.instruments(MarketType::Perpetual).await? {
            if raw.status.as_deref() == Some("Trading")
                && raw.contract_type.as_deref() == Some("LinearPerpetual")
            {
                let settle = raw.settle_coin.as_deref().unwrap_or(&raw.quote_coin).to_string();
                catalog.insert(MarketInfo::perpetual(
                    raw.symbol,
                    &raw.base_coin,
                    &raw.quote_coin,
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
        self.markets.ensure_loaded()?;
        let items = self.tickers(market_type, None).await?;
        Ok(self
            .markets
            .select(market_type, symbols, items, "symbol", parse_ticker)?)
    }

    async fn fetch_ticker(&self, market_type: MarketType, symbol: &str) -> anyhow::Result<TickerSnapshot> {
        let native = self.markets.native_id(symbol)?;
        let item = self
            .tickers(market_type, Some(&native))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::unknown_symbol(symbol))?;
        Ok(parse_ticker(symbol, item))
    }
}
