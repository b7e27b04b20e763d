//! Gate v4 public market data.
//!
//! Gate tickers report top-of-book sizes only as `highest_size` and
//! `lowest_size` in the raw payload, so the snapshot leaves `bid_volume` and
//! `ask_volume` empty and [`GateClient::book_volumes`] reads them from `info`.

use crate::error::{ExchangeError, Result};
use crate::http::{ClientSettings, RestClient};
use crate::market_index::MarketIndex;
use async_trait::async_trait;
use cex_spread_core::{
    decimal_from_json, ExchangeClient, ExchangeId, MarketCatalog, MarketInfo, MarketType,
    TickerSnapshot,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

pub const GATE_API_URL: &str = "https://api.gateio.ws";

#[derive(Debug, Deserialize)]
struct RawCurrencyPair {
    id: String,
    base: String,
    quote: String,
    #[serde(default)]
    trade_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContract {
    name: String,
    #[serde(default)]
    in_delisting: bool,
}

fn ticker_id_field(market_type: MarketType) -> &'static str {
    match market_type {
        MarketType::Spot => "currency_pair",
        MarketType::Perpetual => "contract",
    }
}

fn tickers_path(market_type: MarketType) -> &'static str {
    match market_type {
        MarketType::Spot => "/api/v4/spot/tickers",
        MarketType::Perpetual => "/api/v4/futures/usdt/tickers",
    }
}

fn parse_ticker(symbol: &str, item: serde_json::Value) -> TickerSnapshot {
    let base_volume = match item.get("base_volume") {
        Some(v) => decimal_from_json(v),
        None => decimal_from_json(&item["volume_24h_base"]),
    };
    TickerSnapshot {
        symbol: symbol.to_string(),
        last: decimal_from_json(&item["last"]),
        bid: decimal_from_json(&item["highest_bid"]),
        ask: decimal_from_json(&item["lowest_ask"]),
        bid_volume: None,
        ask_volume: None,
        base_volume,
        timestamp: Utc::now(),
        info: item,
    }
}

pub struct GateClient {
    id: ExchangeId,
    rest: RestClient,
    markets: MarketIndex,
}

impl std::fmt::Debug for GateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateClient")
            .field("base_url", &self.rest.base_url())
            .finish_non_exhaustive()
    }
}

impl GateClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        Self::with_base_url(GATE_API_URL, settings)
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: impl Into<String>, settings: &ClientSettings) -> Result<Self> {
        let id = ExchangeId::new("gate");
        Ok(Self {
            rest: RestClient::new(base_url, settings)?,
            markets: MarketIndex::new(id.clone()),
            id,
        })
    }
}

#[async_trait]
impl ExchangeClient for GateClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn load_markets(&self) -> anyhow::Result<MarketCatalog> {
        let mut catalog = MarketCatalog::new();

        let pairs: Vec<RawCurrencyPair> = self.rest.get("/api/v4/spot/currency_pairs", &[]).await?;
        for raw in pairs {
            if raw.trade_status.as_deref() == Some("tradable") {
                catalog.insert(MarketInfo::spot(raw.id, &raw.base, &raw.quote));
            }
        }

        let contracts: Vec<RawContract> = self.rest.get("/api/v4/futures/usdt/contracts", &[]).await?;
        for raw in contracts {
            if raw.in_delisting {
                continue;
            }
            let Some((base, quote)) = raw.name.split_once('_') else {
                tracing::debug!(contract = %raw.name, "skipping contract with unexpected name");
                continue;
            };
            let (base, quote) = (base.to_string(), quote.to_string());
            catalog.insert(MarketInfo::perpetual(raw.name, &base, &quote, &quote));
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
        let items: Vec<serde_json::Value> = self.rest.get(tickers_path(market_type), &[]).await?;
        Ok(self.markets.select(
            market_type,
            symbols,
            items,
            ticker_id_field(market_type),
            parse_ticker,
        )?)
    }

    async fn fetch_ticker(&self, market_type: MarketType, symbol: &str) -> anyhow::Result<TickerSnapshot> {
        let native = self.markets.native_id(symbol)?;
        let items: Vec<serde_json::Value> = self
            .rest
            .get(
                tickers_path(market_type),
                &[(ticker_id_field(market_type), native.as_str())],
            )
            .await?;
        let item = items
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::unknown_symbol(symbol))?;
        Ok(parse_ticker(symbol, item))
    }

    fn book_volumes(&self, ticker: &TickerSnapshot) -> (Option<Decimal>, Option<Decimal>) {
        (
            decimal_from_json(&ticker.info["highest_size"]),
            decimal_from_json(&ticker.info["lowest_size"]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn loaded_client(server: &MockServer) -> GateClient {
        Mock::given(method("GET"))
            .and(path("/api/v4/spot/currency_pairs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "ADA_USDT", "base": "ADA", "quote": "USDT", "trade_status": "tradable"},
                {"id": "FOO_USDT", "base": "FOO", "quote": "USDT", "trade_status": "untradable"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/futures/usdt/contracts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "ADA_USDT", "type": "direct", "in_delisting": false},
                {"name": "BAR_USDT", "type": "direct", "in_delisting": true}
            ])))
            .mount(server)
            .await;

        let client = GateClient::with_base_url(server.uri(), &ClientSettings::default()).unwrap();
        client.load_markets().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_load_markets() {
        let server = MockServer::start().await;
        let client = loaded_client(&server).await;
        let catalog = client.load_markets().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("ADA/USDT:USDT").unwrap().id, "ADA_USDT");
    }

    #[tokio::test]
    async fn test_book_volumes_come_from_raw_payload() {
        let server = MockServer::start().await;
        let client = loaded_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v4/spot/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "currency_pair": "ADA_USDT", "last": "0.45",
                "lowest_ask": "0.4501", "lowest_size": "1200",
                "highest_bid": "0.4499", "highest_size": "800",
                "base_volume": "5000000"
            }])))
            .mount(&server)
            .await;

        let tickers = client
            .fetch_tickers(MarketType::Spot, &["ADA/USDT".to_string()])
            .await
            .unwrap();
        let ada = &tickers["ADA/USDT"];
        assert_eq!(ada.bid_volume, None);
        assert_eq!(ada.ask, Some(dec!(0.4501)));
        assert_eq!(client.book_volumes(ada), (Some(dec!(800)), Some(dec!(1200))));
    }

    #[tokio::test]
    async fn test_futures_ticker_numeric_sizes() {
        let server = MockServer::start().await;
        let client = loaded_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v4/futures/usdt/tickers"))
            .and(query_param("contract", "ADA_USDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "contract": "ADA_USDT", "last": "0.4502",
                "lowest_ask": "0.4503", "lowest_size": 310,
                "highest_bid": "0.4501", "highest_size": 95,
                "volume_24h_base": "7000000"
            }])))
            .mount(&server)
            .await;

        let ticker = client
            .fetch_ticker(MarketType::Perpetual, "ADA/USDT:USDT")
            .await
            .unwrap();
        assert_eq!(ticker.base_volume, Some(dec!(7000000)));
        assert_eq!(client.book_volumes(&ticker), (Some(dec!(95)), Some(dec!(310))));
    }
}
