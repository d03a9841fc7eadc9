// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use ticker_cache::{
    cache::{
        freshness::ResolveOptions,
        store::{with_timeout, CacheStore},
    },
    config::{load_config, Config},
    provider::{ProviderClient, UnconfiguredProvider, YahooNewsClient, YahooQuoteClient},
    refresh::{RefreshSettings, SchedulerSettings},
    service::{AggregateCacheService, ServiceSettings},
    utils::{setup_logging, Timer},
    Dataset, KeyUniverse, MemoryStore, RedisStore, StoreSelector, SystemClock,
};

#[derive(Debug, Parser)]
#[command(name = "ticker-cache", version, about = "Tiered freshness cache for ticker market data")]
struct Cli {
    /// Overrides LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Which cached data to work on.
    #[arg(long, global = true, value_enum, default_value_t = DatasetArg::News)]
    dataset: DatasetArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daily refresh scheduler until Ctrl-C.
    Serve,
    /// Refresh every supported ticker now, printing stats before and after.
    RefreshAll,
    /// Refresh one ticker now.
    Refresh { ticker: String },
    /// Resolve tickers through the cache.
    Get {
        #[arg(required = true)]
        tickers: Vec<String>,
        #[arg(long)]
        max_age_hours: Option<f64>,
        #[arg(long)]
        force_fresh: bool,
        /// Go to the provider directly for whatever stays stale or missing.
        #[arg(long)]
        direct_fallback: bool,
    },
    /// Print cache statistics.
    Stats {
        #[arg(long)]
        max_age_hours: Option<f64>,
    },
    /// Clear one ticker, or every ticker when none is given.
    Clear { ticker: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DatasetArg {
    News,
    Quotes,
}

impl From<DatasetArg> for Dataset {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::News => Dataset::News,
            DatasetArg::Quotes => Dataset::Quotes,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_persistent(config: &Config, dataset: Dataset) -> Option<Arc<dyn CacheStore>> {
    let url = config.redis_url.as_deref()?;
    let connecting = with_timeout(
        config.store_timeout(),
        "Redis connect".to_string(),
        RedisStore::connect(url, dataset.key_prefix(config)),
    );
    match connecting.await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("⚠️ Could not connect to Redis at {}: {}", url, e);
            None
        }
    }
}

fn build_provider(config: &Config, dataset: Dataset) -> Result<Arc<dyn ProviderClient>> {
    let client: Option<Arc<dyn ProviderClient>> = match dataset {
        Dataset::News => YahooNewsClient::from_config(config)?.map(|c| Arc::new(c) as Arc<dyn ProviderClient>),
        Dataset::Quotes => YahooQuoteClient::from_config(config)?.map(|c| Arc::new(c) as Arc<dyn ProviderClient>),
    };
    Ok(client.unwrap_or_else(|| Arc::new(UnconfiguredProvider)))
}

async fn build_service(config: &Config, dataset: Dataset) -> Result<AggregateCacheService> {
    let store = StoreSelector::select(
        connect_persistent(config, dataset).await,
        Arc::new(MemoryStore::new()),
        config.store_timeout(),
    )
    .await;

    Ok(AggregateCacheService::new(
        store,
        build_provider(config, dataset)?,
        Arc::new(KeyUniverse::new(&config.supported_tickers)),
        Arc::new(SystemClock),
        RefreshSettings::from_config(config),
        ServiceSettings::from_config(config, dataset),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config().context("Failed to load configuration")?;

    let level = match &cli.log_level {
        Some(level) => level.parse().unwrap_or_else(|_| config.log_level_filter()),
        None => config.log_level_filter(),
    };
    setup_logging(level).context("Failed to initialize logging")?;
    config.validate_and_log();

    let service = build_service(&config, cli.dataset.into()).await?;

    match cli.command {
        Command::Serve => {
            let scheduler = service.scheduler(SchedulerSettings::from_config(&config));
            scheduler.start().await;
            info!("🚀 ticker-cache running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            scheduler.stop().await;
            print_json(&scheduler.status().await)?;
        }
        Command::RefreshAll => {
            let mut timer = Timer::start("refresh-all");
            let before = service.get_stats().await;
            info!(
                "📊 Before: {}/{} cached, {} fresh, {} stale",
                before.cached_keys, before.total_keys, before.fresh_keys, before.stale_keys
            );
            let batch = service.refresh_all().await;
            timer.checkpoint("refreshed");
            let after = service.get_stats().await;
            info!(
                "📊 After: {}/{} cached, {} fresh, {} stale",
                after.cached_keys, after.total_keys, after.fresh_keys, after.stale_keys
            );
            timer.finish();
            print_json(&batch)?;
        }
        Command::Refresh { ticker } => {
            print_json(&service.refresh_one(&ticker).await)?;
        }
        Command::Get {
            tickers,
            max_age_hours,
            force_fresh,
            direct_fallback,
        } => {
            let options = ResolveOptions::from_request(
                max_age_hours,
                force_fresh,
                service.default_options().max_age_hours,
            );
            if direct_fallback {
                print_json(&service.get_many_with_direct_fallback(&tickers, &options).await)?;
            } else {
                print_json(&service.get_many(&tickers, &options).await)?;
            }
        }
        Command::Stats { max_age_hours } => {
            let stats = match max_age_hours {
                Some(hours) => service.get_stats_with_max_age(hours).await,
                None => service.get_stats().await,
            };
            print_json(&stats)?;
        }
        Command::Clear { ticker: Some(ticker) } => {
            print_json(&service.clear_one(&ticker).await)?;
        }
        Command::Clear { ticker: None } => {
            print_json(&service.clear_all().await)?;
        }
    }

    Ok(())
}
