pub mod config;
pub mod config_loader;
pub mod registry;
pub mod traits;
pub mod types;

pub use config::{AppConfig, MarketFees, NetworkConfig, ScannerConfig, SupervisorConfig};
pub use config_loader::{AllowList, ConfigLoader, DEFAULT_CONFIG_PATH};
pub use registry::ExchangeRegistry;
pub use traits::ExchangeClient;
pub use types::{
    decimal_from_json, ExchangeId, MarketCatalog, MarketId, MarketInfo, MarketType, TickerSnapshot,
};
