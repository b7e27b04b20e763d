//! Builds exchange clients by id.
//!
//! New venues are added with [`ExchangeFactory::register`]; the scanner
//! itself never names a concrete adapter.

use crate::binance::BinanceClient;
use crate::bitget::BitgetClient;
use crate::bybit::BybitClient;
use crate::error::{ExchangeError, Result};
use crate::gate::GateClient;
use crate::http::ClientSettings;
use crate::okx::OkxClient;
use cex_spread_core::{ExchangeClient, ExchangeId, ExchangeRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Constructor for one adapter.
pub type ClientConstructor = fn(&ClientSettings) -> Result<Arc<dyn ExchangeClient>>;

pub struct ExchangeFactory {
    constructors: BTreeMap<ExchangeId, ClientConstructor>,
}

impl std::fmt::Debug for ExchangeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeFactory")
            .field("supported", &self.supported())
            .finish()
    }
}

impl Default for ExchangeFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ExchangeFactory {
    /// Factory without any adapters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Factory with every adapter shipped in this crate.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut factory = Self::empty();
        factory.register("bybit", |s| Ok(Arc::new(BybitClient::new(s)?)));
        factory.register("bitget", |s| Ok(Arc::new(BitgetClient::new(s)?)));
        factory.register("binance", |s| Ok(Arc::new(BinanceClient::new(s)?)));
        factory.register("okx", |s| Ok(Arc::new(OkxClient::new(s)?)));
        factory.register("gate", |s| Ok(Arc::new(GateClient::new(s)?)));
        factory
    }

    pub fn register(&mut self, id: impl Into<ExchangeId>, constructor: ClientConstructor) {
        self.constructors.insert(id.into(), constructor);
    }

    #[must_use]
    pub fn supports(&self, id: &ExchangeId) -> bool {
        self.constructors.contains_key(id)
    }

    #[must_use]
    pub fn supported(&self) -> Vec<ExchangeId> {
        self.constructors.keys().cloned().collect()
    }

    /// # Errors
    /// Returns error if the id is unknown or the client cannot be built.
    pub fn create(&self, id: &ExchangeId, settings: &ClientSettings) -> Result<Arc<dyn ExchangeClient>> {
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| ExchangeError::Configuration(format!("unsupported exchange '{id}'")))?;
        constructor(settings)
    }

    /// Builds a registry for `ids`, in that order.
    ///
    /// Ids that are unknown or fail to build are logged and left out.
    #[must_use]
    pub fn build_registry(&self, ids: &[ExchangeId], settings: &ClientSettings) -> ExchangeRegistry {
        let mut registry = ExchangeRegistry::new();
        for id in ids {
            match self.create(id, settings) {
                Ok(client) => registry.register(client),
                Err(e) => tracing::error!(exchange = %id, "skipping exchange: {}", e),
            }
        }
        tracing::info!(exchanges = ?registry.ids(), "exchange registry ready");
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_adapters() {
        let factory = ExchangeFactory::with_builtin();
        for id in ["bybit", "bitget", "binance", "okx", "gate"] {
            assert!(factory.supports(&ExchangeId::new(id)), "{id} missing");
        }
    }

    #[test]
    fn test_registry_keeps_order_and_skips_unknown() {
        let factory = ExchangeFactory::with_builtin();
        let ids = vec![
            ExchangeId::new("okx"),
            ExchangeId::new("kraken"),
            ExchangeId::new("BYBIT"),
        ];
        let registry = factory.build_registry(&ids, &ClientSettings::default());
        assert_eq!(
            registry.ids(),
            vec![ExchangeId::new("okx"), ExchangeId::new("bybit")]
        );
    }

    #[test]
    fn test_create_unknown_is_configuration_error() {
        let factory = ExchangeFactory::empty();
        let err = factory
            .create(&ExchangeId::new("bybit"), &ClientSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, ExchangeError::Configuration(_)));
    }

    #[test]
    fn test_register_custom_adapter() {
        let mut factory = ExchangeFactory::empty();
        factory.register("mirror", |s| {
            Ok(Arc::new(BybitClient::with_base_url("http://127.0.0.1:9", s)?))
        });
        assert!(factory.supports(&ExchangeId::new("mirror")));
        assert!(factory
            .create(&ExchangeId::new("mirror"), &ClientSettings::default())
            .is_ok());
    }
}
