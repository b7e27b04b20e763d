use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::collections::BTreeSet;
use std::path::Path;

/// Default location of the TOML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Prefix of environment overrides, e.g. `CEX_SPREAD_SCANNER__TOP_N=5`.
pub const ENV_PREFIX: &str = "CEX_SPREAD_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by layering built-in defaults, the TOML file at `path`
    /// (skipped when absent), and `CEX_SPREAD_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config.validate()?;
        tracing::debug!(path = %path.display(), exchanges = ?config.exchanges, "configuration loaded");
        Ok(config)
    }
}

/// Base assets the scanner is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    coins: BTreeSet<String>,
}

impl AllowList {
    /// Parses one base asset per line; blank lines are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let coins = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
        Self { coins }
    }

    /// Reads the allow-list file.
    ///
    /// Returns `None` when the file does not exist or lists no coins, meaning
    /// every base asset is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no allow-list file, scanning all base assets");
            return Ok(None);
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read allow-list {}", path.display()))?;
        let list = Self::parse(&text);
        if list.is_empty() {
            return Ok(None);
        }

        tracing::info!(path = %path.display(), coins = list.len(), "allow-list loaded");
        Ok(Some(list))
    }

    #[must_use]
    pub fn contains(&self, coin: &str) -> bool {
        self.coins.contains(coin)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.coins.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
