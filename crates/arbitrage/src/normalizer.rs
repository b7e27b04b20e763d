use crate::types::{PriceTable, Quote};
use cex_spread_core::{ExchangeClient, MarketCatalog, TickerSnapshot};
use std::collections::HashMap;
use tracing::trace;

/// Reduces raw tickers to a base asset → [`Quote`] table.
#[derive(Debug, Clone)]
pub struct PriceNormalizer {
    quote_currency: String,
}

impl PriceNormalizer {
    #[must_use]
    pub fn new(quote_currency: impl Into<String>) -> Self {
        Self {
            quote_currency: quote_currency.into(),
        }
    }

    /// Base asset of a catalog base, with the quote marker stripped.
    #[must_use]
    pub fn base_asset(&self, catalog_base: &str) -> String {
        catalog_base.replace(&self.quote_currency, "")
    }

    /// Builds the price table of one market.
    ///
    /// Tickers without a last price, symbols missing from `catalog` and
    /// bases that strip to nothing are left out. Symbols are visited in
    /// sorted order so a base mapped by two symbols resolves the same way
    /// every time.
    #[must_use]
    pub fn normalize(
        &self,
        client: &dyn ExchangeClient,
        catalog: &MarketCatalog,
        tickers: &HashMap<String, TickerSnapshot>,
    ) -> PriceTable {
        let mut symbols: Vec<&String> = tickers.keys().collect();
        symbols.sort();

        let mut table = PriceTable::new();
        for symbol in symbols {
            let ticker = &tickers[symbol];
            let Some(price) = ticker.last else {
                continue;
            };
            let Some(market) = catalog.get(symbol) else {
                trace!(exchange = %client.id(), symbol = %symbol, "ticker for unknown symbol");
                continue;
            };
            let base = self.base_asset(&market.base);
            if base.is_empty() {
                continue;
            }

            let (bid_volume, ask_volume) = client.book_volumes(ticker);
            table.insert(
                base,
                Quote {
                    price,
                    symbol: symbol.clone(),
                    bid: ticker.bid,
                    ask: ticker.ask,
                    bid_volume,
                    ask_volume,
                    base_volume: ticker.base_volume,
                },
            );
        }
        table
    }
}
