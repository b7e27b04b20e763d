use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use cex_spread_arbitrage::{
    PairWatch, PairWatchConfig, RetryPolicy, ScanPipeline, Supervisor, SymbolResolver,
};
use cex_spread_core::{AllowList, AppConfig, ConfigLoader, ExchangeId, DEFAULT_CONFIG_PATH};
use cex_spread_exchanges::{ClientSettings, ExchangeFactory};

mod display;

use display::ConsoleSink;

#[derive(Parser, Debug)]
#[command(name = "cex-spread")]
#[command(about = "Cross-exchange spot/perpetual spread monitor", long_about = None)]
struct Cli {
    /// Proxy for all exchange requests, e.g. http://127.0.0.1:7897
    #[arg(short, long, env = "CEX_SPREAD_PROXY")]
    proxy: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Watch the two markets of this pair config instead of scanning everything
    #[arg(long)]
    pair: Option<PathBuf>,

    /// Print the table without clearing the screen or colors
    #[arg(long)]
    plain: bool,
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let mut config = ConfigLoader::load_from(&cli.config)?;
    if let Some(proxy) = cli.proxy.clone() {
        config.network.proxy = Some(proxy);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping...");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = match &cli.pair {
        Some(path) => run_pair_watch(&config, path, shutdown_rx).await,
        None => run_scanner(&config, cli.plain, shutdown_rx).await,
    };
    if let Err(e) = &result {
        error!("fatal: {:#}", e);
    }

    info!("shutdown complete");
    result
}

async fn run_scanner(config: &AppConfig, plain: bool, shutdown: watch::Receiver<bool>) -> Result<()> {
    let settings = ClientSettings::from_config(config);
    let registry = ExchangeFactory::with_builtin().build_registry(&config.exchange_ids(), &settings);
    if registry.is_empty() {
        anyhow::bail!("none of the configured exchanges could be created");
    }

    let allow_list = AllowList::load(&config.coins_file)?;

    let resolver = SymbolResolver::new(config.scanner.quote_currency.clone(), allow_list);
    let markets = resolver.load_all(&registry).await;

    let pipeline = &ScanPipeline::new(registry, markets, config);
    let sink = &ConsoleSink { plain };
    let mut supervisor = Supervisor::new(RetryPolicy::from_config(&config.supervisor), shutdown);

    supervisor.run(move || pipeline.run_once(sink)).await;
    Ok(())
}

async fn run_pair_watch(
    config: &AppConfig,
    path: &Path,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let pair = PairWatchConfig::load(path)?;

    let mut ids: Vec<ExchangeId> = vec![pair.market1.exchange.clone()];
    if pair.market2.exchange != pair.market1.exchange {
        ids.push(pair.market2.exchange.clone());
    }
    let settings = ClientSettings::from_config(config);
    let registry = ExchangeFactory::with_builtin().build_registry(&ids, &settings);

    let watcher = PairWatch::new(pair, &registry)?;
    watcher.prepare().await?;

    let watcher = &watcher;
    let mut supervisor = Supervisor::new(RetryPolicy::from_config(&config.supervisor), shutdown);
    supervisor
        .run(move || async move { watcher.poll().await.map(|_| ()) })
        .await;
    Ok(())
}
