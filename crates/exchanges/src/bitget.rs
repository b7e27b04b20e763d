//! Bitget v2 public market data (spot and USDT-margined perpetuals).

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

pub const BITGET_API_URL: &str = "https://api.bitget.com";

const PRODUCT_TYPE: &str = "USDT-FUTURES";
const SUCCESS: &str = "00000";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSymbol {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    symbol_type: Option<String>,
    #[serde(default)]
    symbol_status: Option<String>,
}

fn parse_ticker(symbol: &str, item: serde_json::Value) -> TickerSnapshot {
    TickerSnapshot {
        symbol: symbol.to_string(),
        last: decimal_from_json(&item["lastPr"]),
        bid: decimal_from_json(&item["bidPr"]),
        ask: decimal_from_json(&item["askPr"]),
        bid_volume: decimal_from_json(&item["bidSz"]),
        ask_volume: decimal_from_json(&item["askSz"]),
        base_volume: decimal_from_json(&item["baseVolume"]),
        timestamp: Utc::now(),
        info: item,
    }
}

pub struct BitgetClient {
    id: ExchangeId,
    rest: RestClient,
    markets: MarketIndex,
}

impl std::fmt::Debug for BitgetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetClient")
            .field("base_url", &self.rest.base_url())
            .finish_non_exhaustive()
    }
}

impl BitgetClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        Self::with_base_url(BITGET_API_URL, settings)
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: impl Into<String>, settings: &ClientSettings) -> Result<Self> {
        let id = ExchangeId::new("bitget");
        Ok(Self {
            rest: RestClient::new(base_url, settings)?,
            markets: MarketIndex::new(id.clone()),
            id,
        })
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let envelope: Envelope<T> = self.rest.get(path, query).await?;
        if envelope.code != SUCCESS {
            return Err(ExchangeError::rejected(envelope.code, envelope.msg));
        }
        Ok(envelope.data.unwrap_or_default())
    }

    async fn tickers(&self, market_type: MarketType, native: Option<&str>) -> Result<Vec<serde_json::Value>> {
        match (market_type, native) {
            (MarketType::Spot, None) => self.get_data("/api/v2/spot/market/tickers", &[]).await,
            (MarketType::Spot, Some(symbol)) => {
                self.get_data("/api/v2/spot/market/tickers", &[("symbol", symbol)])
                    .await
            }
            (MarketType::Perpetual, None) => {
                self.get_data("/api/v2/mix/market/tickers", &[("productType", PRODUCT_TYPE)])
                    .await
            }
            (MarketType::Perpetual, Some(symbol)) => {
                self.get_data(
                    "/api/v2/mix/market/ticker",
                    &[("symbol", symbol), ("productType", PRODUCT_TYPE)],
                )
                .await
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for BitgetClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn load_markets(&self) -> anyhow::Result<MarketCatalog> {
        let mut catalog = MarketCatalog::new();

        let spot: Vec<RawSymbol> = self.get_data("/api/v2/spot/public/symbols", &[]).await?;
        for raw in spot {
            if raw.status.as_deref() == Some("online") {
                catalog.insert(MarketInfo::spot(raw.symbol, &raw.base_coin, &raw.quote_coin));
            }
        }

        let contracts: Vec<RawSymbol> = self
            .get_data("/api/v2/mix/market/contracts", &[("productType", PRODUCT_TYPE)])
            .await?;
        for raw in contracts {
            if raw.symbol_type.as_deref() == Some("perpetual")
                && raw.symbol_status.as_deref() == Some("normal")
            {
                catalog.insert(MarketInfo::perpetual(
                    raw.symbol,
                    &raw.base_coin,
                    &raw.quote_coin,
                    &raw.quote_coin,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn loaded_client(server: &MockServer) -> BitgetClient {
        Mock::given(method("GET"))
            .and(path("/api/v2/spot/public/symbols"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "00000", "msg": "success",
                "data": [
                    {"symbol": "XRPUSDT", "baseCoin": "XRP", "quoteCoin": "USDT", "status": "online"},
                    {"symbol": "ABCUSDT", "baseCoin": "ABC", "quoteCoin": "USDT", "status": "offline"}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/contracts"))
            .and(query_param("productType", "USDT-FUTURES"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "00000", "msg": "success",
                "data": [
                    {"symbol": "XRPUSDT", "baseCoin": "XRP", "quoteCoin": "USDT",
                     "symbolType": "perpetual", "symbolStatus": "normal"}
                ]
            })))
            .mount(server)
            .await;

        let client = BitgetClient::with_base_url(server.uri(), &ClientSettings::default()).unwrap();
        client.load_markets().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_load_markets() {
        let server = MockServer::start().await;
        let client = loaded_client(&server).await;
        let catalog = client.load_markets().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("XRP/USDT").is_some());
        assert!(catalog.get("XRP/USDT:USDT").is_some());
    }

    #[tokio::test]
    async fn test_fetch_perpetual_tickers() {
        let server = MockServer::start().await;
        let client = loaded_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v2/mix/market/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "00000", "msg": "success",
                "data": [{
                    "symbol": "XRPUSDT", "lastPr": "0.61",
                    "bidPr": "0.6099", "bidSz": "5000", "askPr": "0.6101", "askSz": "4200",
                    "baseVolume": "90000000"
                }]
            })))
            .mount(&server)
            .await;

        let tickers = client
            .fetch_tickers(MarketType::Perpetual, &["XRP/USDT:USDT".to_string()])
            .await
            .unwrap();
        let xrp = &tickers["XRP/USDT:USDT"];
        assert_eq!(xrp.last, Some(dec!(0.61)));
        assert_eq!(xrp.ask_volume, Some(dec!(4200)));
    }

    #[tokio::test]
    async fn test_failure_code_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "40034", "msg": "Parameter does not exist", "data": null
            })))
            .mount(&server)
            .await;

        let client = BitgetClient::with_base_url(server.uri(), &ClientSettings::default()).unwrap();
        let err = client.load_markets().await.unwrap_err();
        assert!(err.to_string().contains("40034"));
    }
}
