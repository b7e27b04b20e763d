//! Turns exchange catalogs into the spot and perpetual symbol sets to poll.

use cex_spread_core::{AllowList, ExchangeId, ExchangeRegistry, MarketCatalog, MarketType};
use std::collections::HashMap;
use tracing::{error, info};

/// Symbols to poll on one exchange, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSets {
    pub spot: Vec<String>,
    pub perp: Vec<String>,
}

impl SymbolSets {
    #[must_use]
    pub fn get(&self, market_type: MarketType) -> &[String] {
        match market_type {
            MarketType::Spot => &self.spot,
            MarketType::Perpetual => &self.perp,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spot.is_empty() && self.perp.is_empty()
    }
}

/// Catalog and symbol sets of one exchange.
#[derive(Debug, Clone, Default)]
pub struct ResolvedExchange {
    pub catalog: MarketCatalog,
    pub symbols: SymbolSets,
}

/// Resolution result for every registered exchange.
///
/// Exchanges whose catalog failed to load are present with empty sets.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMarkets {
    exchanges: HashMap<ExchangeId, ResolvedExchange>,
}

impl ResolvedMarkets {
    pub fn insert(&mut self, id: ExchangeId, resolved: ResolvedExchange) {
        self.exchanges.insert(id, resolved);
    }

    #[must_use]
    pub fn get(&self, id: &ExchangeId) -> Option<&ResolvedExchange> {
        self.exchanges.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SymbolResolver {
    quote_currency: String,
    allow_list: Option<AllowList>,
}

impl SymbolResolver {
    #[must_use]
    pub fn new(quote_currency: impl Into<String>, allow_list: Option<AllowList>) -> Self {
        Self {
            quote_currency: quote_currency.into(),
            allow_list,
        }
    }

    /// Selects the quote-currency spot and perpetual symbols of a catalog.
    ///
    /// With an allow-list, spot symbols must start with `COIN/QUOTE` and
    /// perpetual symbols with `COIN/QUOTE:` for a listed coin.
    #[must_use]
    pub fn resolve(&self, catalog: &MarketCatalog) -> SymbolSets {
        let mut sets = SymbolSets::default();

        for market in catalog.iter() {
            if !market.symbol.contains(&self.quote_currency) {
                continue;
            }
            if market.spot && self.allowed(&market.symbol, MarketType::Spot) {
                sets.spot.push(market.symbol.clone());
            }
            if market.swap && self.allowed(&market.symbol, MarketType::Perpetual) {
                sets.perp.push(market.symbol.clone());
            }
        }

        sets
    }

    fn allowed(&self, symbol: &str, market_type: MarketType) -> bool {
        let Some(list) = &self.allow_list else {
            return true;
        };
        list.iter().any(|coin| {
            let prefix = match market_type {
                MarketType::Spot => format!("{coin}/{}", self.quote_currency),
                MarketType::Perpetual => format!("{coin}/{}:", self.quote_currency),
            };
            symbol.starts_with(&prefix)
        })
    }

    /// Loads every registered exchange's catalog once and resolves it.
    ///
    /// A failed catalog load is logged and leaves that exchange with empty
    /// sets; it is not retried.
    pub async fn load_all(&self, registry: &ExchangeRegistry) -> ResolvedMarkets {
        let mut resolved = ResolvedMarkets::default();

        for client in registry.iter() {
            let id = client.id().clone();
            let entry = match client.load_markets().await {
                Ok(catalog) => {
                    let symbols = self.resolve(&catalog);
                    info!(
                        exchange = %id,
                        spot = symbols.spot.len(),
                        perp = symbols.perp.len(),
                        "resolved symbols"
                    );
                    ResolvedExchange { catalog, symbols }
                }
                Err(e) => {
                    error!(exchange = %id, "failed to load markets: {:#}", e);
                    ResolvedExchange::default()
                }
            };
            resolved.insert(id, entry);
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cex_spread_core::MarketInfo;

    fn catalog() -> MarketCatalog {
        [
            MarketInfo::spot("BTCUSDT", "BTC", "USDT"),
            MarketInfo::spot("BTCUSDC", "BTC", "USDC"),
            MarketInfo::spot("ETHUSDT", "ETH", "USDT"),
            MarketInfo::perpetual("BTCUSDT", "BTC", "USDT", "USDT"),
            MarketInfo::perpetual("SOLUSDT", "SOL", "USDT", "USDT"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_resolve_without_allow_list() {
        let resolver = SymbolResolver::new("USDT", None);
        let sets = resolver.resolve(&catalog());
        assert_eq!(sets.spot, vec!["BTC/USDT", "ETH/USDT"]);
        assert_eq!(sets.perp, vec!["BTC/USDT:USDT", "SOL/USDT:USDT"]);
    }

    #[test]
    fn test_resolve_with_allow_list() {
        let resolver = SymbolResolver::new("USDT", Some(AllowList::parse("BTC\nSOL")));
        let sets = resolver.resolve(&catalog());
        assert_eq!(sets.spot, vec!["BTC/USDT"]);
        assert_eq!(sets.perp, vec!["BTC/USDT:USDT", "SOL/USDT:USDT"]);
        assert_eq!(sets.get(MarketType::Perpetual).len(), 2);
    }

    #[test]
    fn test_allow_list_matches_prefix_not_substring() {
        let catalog: MarketCatalog = [MarketInfo::spot("WBTCUSDT", "WBTC", "USDT")]
            .into_iter()
            .collect();
        let resolver = SymbolResolver::new("USDT", Some(AllowList::parse("BTC")));
        assert!(resolver.resolve(&catalog).is_empty());
    }
}
