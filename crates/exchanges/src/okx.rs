//! OKX v5 public market data.
//!
//! Swap book sizes (`bidSz`/`askSz`) are quoted in contracts, as the
//! exchange reports them.

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

pub const OKX_API_URL: &str = "https://www.okx.com";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstrument {
    inst_id: String,
    #[serde(default)]
    base_ccy: String,
    #[serde(default)]
    quote_ccy: String,
    #[serde(default)]
    ct_type: String,
    #[serde(default)]
    ct_val_ccy: String,
    #[serde(default)]
    settle_ccy: String,
    #[serde(default)]
    uly: String,
    #[serde(default)]
    state: String,
}

impl RawInstrument {
    fn into_market(self, market_type: MarketType) -> Option<MarketInfo> {
        if self.state != "live" {
            return None;
        }
        match market_type {
            MarketType::Spot => Some(MarketInfo::spot(self.inst_id, &self.base_ccy, &self.quote_ccy)),
            MarketType::Perpetual => {
                if self.ct_type != "linear" {
                    return None;
                }
                // uly is BASE-QUOTE
                let (_, quote) = self.uly.split_once('-')?;
                let quote = quote.to_string();
                Some(MarketInfo::perpetual(
                    self.inst_id,
                    &self.ct_val_ccy,
                    &quote,
                    &self.settle_ccy,
                ))
            }
        }
    }
}

fn inst_type(market_type: MarketType) -> &'static str {
    match market_type {
        MarketType::Spot => "SPOT",
        MarketType::Perpetual => "SWAP",
    }
}

fn parse_ticker(symbol: &str, item: serde_json::Value) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.to_string(),
        last: decimal_from_json(&item["last"]),
        bid: decimal_from_json(&item["bidPx"]),
        ask: decimal_from_json(&item["askPx"]),
        // contracts for SWAP, base units for SPOT
        bid_volume: decimal_from_json(&item["bidSz"]),
        ask_volume: decimal_from_json(&item["askSz"]),
        base_volume: decimal_from_json(&item["vol24h"]),
        timestamp: Utc::now(),
        info: item,
    }
}

pub struct OkxClient {
    id: ExchangeId,
    rest: RestClient,
    markets: MarketIndex,
}

impl std::fmt::Debug for OkxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxClient")
            .field("base_url", &self.rest.base_url())
            .finish_non_exhaustive()
    }
}

impl OkxClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        Self::with_base_url(OKX_API_URL, settings)
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: impl Into<String>, settings: &ClientSettings) -> Result<Self> {
        let id = ExchangeId::new("okx");
        Ok(Self {
            rest: RestClient::new(base_url, settings)?,
            markets: MarketIndex::new(id.clone()),
            id,
        })
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let envelope: Envelope<T> = self.rest.get(path, query).await?;
        if envelope.code != "0" {
            return Err(ExchangeError::rejected(envelope.code, envelope.msg));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl ExchangeClient for OkxClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn load_markets(&self) -> anyhow::Result<MarketCatalog> {
        let mut catalog = MarketCatalog::new();
        for market_type in MarketType::ALL {
            let instruments: Vec<RawInstrument> = self
                .get_data("/api/v5/public/instruments", &[("instType", inst_type(market_type))])
                .await?;
            catalog.extend(
                instruments
                    .into_iter()
                    .filter_map(|raw| raw.into_market(market_type)),
            );
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
        let items: Vec<serde_json::Value> = self
            .get_data("/api/v5/market/tickers", &[("instType", inst_type(market_type))])
            .await?;
        Ok(self
            .markets
            .select(market_type, symbols, items, "instId", parse_ticker)?)
    }

    async fn fetch_ticker(&self, _market_type: MarketType, symbol: &str) -> anyhow::Result<TickerSnapshot> {
        let native = self.markets.native_id(symbol)?;
        let item = self
            .get_data::<serde_json::Value>("/api/v5/market/ticker", &[("instId", native.as_str())])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::unknown_symbol(symbol))?;
        Ok(parse_ticker(symbol, item))
    }
}
