//! Mapping between unified symbols and exchange-native instrument ids.
//!
//! Adapters fill the index from `load_markets` and consult it for every
//! ticker request.

use crate::error::{ExchangeError, Result};
use cex_spread_core::{ExchangeId, MarketCatalog, MarketType, TickerSnapshot};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct SymbolIndex {
    to_native: HashMap<String, String>,
    to_unified: HashMap<(MarketType, String), String>,
}

impl SymbolIndex {
    fn from_catalog(catalog: &MarketCatalog) -> Self {
        let mut index = Self::default();
        for market in catalog.iter() {
            let Some(market_type) = market.market_type() else {
                continue;
            };
            index
                .to_native
                .insert(market.symbol.clone(), market.id.clone());
            index
                .to_unified
                .insert((market_type, market.id.clone()), market.symbol.clone());
        }
        index
    }
}

/// Symbol index of one exchange, replaced wholesale on every catalog load.
#[derive(Debug)]
pub struct MarketIndex {
    exchange: ExchangeId,
    inner: RwLock<SymbolIndex>,
}

impl MarketIndex {
    #[must_use]
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            inner: RwLock::new(SymbolIndex::default()),
        }
    }

    pub fn store(&self, catalog: &MarketCatalog) {
        *self.inner.write() = SymbolIndex::from_catalog(catalog);
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.inner.read().to_native.is_empty()
    }

    /// Fails with `MarketsNotLoaded` until a catalog has been stored.
    pub fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(ExchangeError::MarketsNotLoaded {
                exchange: self.exchange.to_string(),
            })
        }
    }

    /// Native instrument id of a unified symbol.
    pub fn native_id(&self, symbol: &str) -> Result<String> {
        let index = self.inner.read();
        if index.to_native.is_empty() {
            return Err(ExchangeError::MarketsNotLoaded {
                exchange: self.exchange.to_string(),
            });
        }
        index
            .to_native
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::unknown_symbol(symbol))
    }

    /// Native ids of the requested symbols, skipping unknown ones.
    pub fn native_ids(&self, symbols: &[String]) -> Result<Vec<String>> {
        let index = self.inner.read();
        if index.to_native.is_empty() {
            return Err(ExchangeError::MarketsNotLoaded {
                exchange: self.exchange.to_string(),
            });
        }
        Ok(symbols
            .iter()
            .filter_map(|s| index.to_native.get(s).cloned())
            .collect())
    }

    /// Keeps the raw ticker items whose native id resolves to one of the
    /// requested symbols, parsing each with `parse`.
    ///
    /// `id_field` names the JSON key holding the native id.
    pub fn select<F>(
        &self,
        market_type: MarketType,
        symbols: &[String],
        items: Vec<serde_json::Value>,
        id_field: &str,
        parse: F,
    ) -> Result<HashMap<String, TickerSnapshot>>
    where
        F: Fn(&str, serde_json::Value) -> TickerSnapshot,
    {
        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        let index = self.inner.read();
        if index.to_native.is_empty() {
            return Err(ExchangeError::MarketsNotLoaded {
                exchange: self.exchange.to_string(),
            });
        }

        let mut tickers = HashMap::with_capacity(wanted.len());
        for item in items {
            let Some(native) = item.get(id_field).and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(symbol) = index.to_unified.get(&(market_type, native.to_string())) else {
                continue;
            };
            if wanted.contains(symbol.as_str()) {
                tickers.insert(symbol.clone(), parse(symbol, item));
            }
        }
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cex_spread_core::MarketInfo;
    use serde_json::json;

    fn index() -> MarketIndex {
        let catalog: MarketCatalog = [
            MarketInfo::spot("BTCUSDT", "BTC", "USDT"),
            MarketInfo::perpetual("BTCUSDT", "BTC", "USDT", "USDT"),
            MarketInfo::spot("ETHUSDT", "ETH", "USDT"),
        ]
        .into_iter()
        .collect();
        let index = MarketIndex::new(ExchangeId::new("bybit"));
        index.store(&catalog);
        index
    }

    #[test]
    fn test_same_native_id_resolves_per_market_type() {
        let index = index();
        let items = vec![json!({"symbol": "BTCUSDT", "lastPrice": "1"})];
        let wanted = vec!["BTC/USDT:USDT".to_string()];

        let tickers = index
            .select(MarketType::Perpetual, &wanted, items, "symbol", |s, _| {
                TickerSnapshot::new(s)
            })
            .unwrap();
        assert!(tickers.contains_key("BTC/USDT:USDT"));
        assert_eq!(index.native_id("BTC/USDT:USDT").unwrap(), "BTCUSDT");
    }

    #[test]
    fn test_select_drops_unrequested_and_unknown() {
        let index = index();
        let items = vec![
            json!({"symbol": "BTCUSDT"}),
            json!({"symbol": "ETHUSDT"}),
            json!({"symbol": "DOGEUSDT"}),
            json!({"other": "x"}),
        ];
        let wanted = vec!["ETH/USDT".to_string()];

        let tickers = index
            .select(MarketType::Spot, &wanted, items, "symbol", |s, _| {
                TickerSnapshot::new(s)
            })
            .unwrap();
        assert_eq!(tickers.len(), 1);
        assert!(tickers.contains_key("ETH/USDT"));
    }

    #[test]
    fn test_unloaded_index_is_an_error() {
        let index = MarketIndex::new(ExchangeId::new("okx"));
        assert!(!index.is_loaded());
        assert!(matches!(
            index.native_id("BTC/USDT"),
            Err(ExchangeError::MarketsNotLoaded { .. })
        ));
    }

    #[test]
    fn test_unknown_symbol() {
        let index = index();
        assert!(matches!(
            index.native_id("XRP/USDT"),
            Err(ExchangeError::UnknownSymbol { .. })
        ));
        assert_eq!(
            index
                .native_ids(&["XRP/USDT".to_string(), "BTC/USDT".to_string()])
                .unwrap(),
            vec!["BTCUSDT".to_string()]
        );
    }
}
