//! Public market-data adapters for centralized exchanges.
//!
//! Each adapter implements [`cex_spread_core::ExchangeClient`] over the
//! exchange's unauthenticated REST API:
//!
//! - Catalog of spot pairs and USDT-margined linear perpetuals
//! - Bulk and single-symbol top-of-book tickers
//!
//! All requests go through a [`RestClient`] that applies a per-exchange
//! rate limit, request timeout and optional proxy.
//!
//! # Example
//!
//! ```ignore
//! use cex_spread_exchanges::{ClientSettings, ExchangeFactory};
//! use cex_spread_core::ExchangeId;
//!
//! let factory = ExchangeFactory::with_builtin();
//! let registry = factory.build_registry(
//!     &[ExchangeId::new("bybit"), ExchangeId::new("okx")],
//!     &ClientSettings::default(),
//! );
//! ```

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod error;
pub mod factory;
pub mod gate;
pub mod http;
pub mod market_index;
pub mod okx;

pub use binance::BinanceClient;
pub use bitget::BitgetClient;
pub use bybit::BybitClient;
pub use error::{ExchangeError, Result};
pub use factory::{ClientConstructor, ExchangeFactory};
pub use gate::GateClient;
pub use http::{ClientSettings, RestClient};
pub use okx::OkxClient;
