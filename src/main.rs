use anyhow::Context;
use clap::Parser;
use orders_service::adapters::{PostgresStore, WsFeed};
use orders_service::api::{self, AppState};
use orders_service::cache::OrderCache;
use orders_service::cli::{Cli, Commands};
use orders_service::config::AppConfig;
use orders_service::coordination::{Shutdown, ShutdownSignal};
use orders_service::domain::OrderRecord;
use orders_service::emulator::{self, EmulatorConfig};
use orders_service::ingest::IngestionPipeline;
use orders_service::persistence::OrderStore;
use orders_service::services::{HealthState, OrderQuery};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{graceful_shutdown, init_logging, init_logging_simple};

const PIPELINE_STOP_TIMEOUT_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Validate { file }) => {
            init_logging_simple();
            run_validate(file)
        }
        Some(Commands::Produce {
            port,
            interval_ms,
            count,
            duplicate_every,
            malformed_every,
        }) => {
            init_logging(&AppConfig::default_config().logging);
            let config = EmulatorConfig {
                interval: Duration::from_millis(*interval_ms),
                count: *count,
                duplicate_every: *duplicate_every,
                malformed_every: *malformed_every,
            };
            run_produce(*port, config).await
        }
        Some(Commands::Serve { .. }) | None => {
            let config = load_config(&cli)?;
            init_logging(&config.logging);
            run_service(config).await
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    cli.apply_overrides(&mut config);

    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(config)
}

fn run_validate(file: &std::path::Path) -> anyhow::Result<()> {
    let order = OrderRecord::load_from_file(file)
        .with_context(|| format!("{} is not a valid order", file.display()))?;
    println!("{}", order);
    Ok(())
}

async fn run_produce(port: u16, config: EmulatorConfig) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    let signals = shutdown.clone();
    tokio::spawn(async move { signals.trigger_on_os_signal().await });

    emulator::serve(port, config, shutdown.listener()).await?;
    Ok(())
}

async fn run_service(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting orders service");

    let shutdown = Shutdown::new();
    {
        let signals = shutdown.clone();
        tokio::spawn(async move { signals.trigger_on_os_signal().await });
    }

    let postgres = PostgresStore::new(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout(),
    )
    .await
    .context("database connection failed")?;
    postgres.migrate().await.context("database migration failed")?;
    let store: Arc<dyn OrderStore> = Arc::new(postgres.clone());

    let cache = Arc::new(OrderCache::new(config.cache.capacity)?);

    // Warm the cache before the API starts answering
    match cache
        .populate(store.as_ref(), config.cache.effective_warm_limit())
        .await
    {
        Ok(report) => info!(
            "Cache warmed with {} orders ({} skipped)",
            report.loaded, report.skipped
        ),
        Err(e) => warn!("Cache warm-up failed, starting cold: {}", e),
    }

    let mut feed = WsFeed::new(&config.feed.url)?
        .with_max_reconnect_delay(config.feed.max_reconnect_delay());
    if let Some(timeout) = config.feed.receive_timeout() {
        feed = feed.with_receive_timeout(timeout);
    }

    let pipeline = IngestionPipeline::new(feed, Arc::clone(&store), Arc::clone(&cache));
    let health = Arc::new(
        HealthState::new(Arc::clone(&store), Arc::clone(&cache)).with_pipeline(pipeline.monitor()),
    );
    let pipeline_handle = tokio::spawn(pipeline.run(shutdown.listener()));

    let state = AppState::new(OrderQuery::new(Arc::clone(&store), cache), health);
    let served = api::serve(config.http.port, state, shutdown.listener()).await;
    if let Err(ref e) = served {
        error!("HTTP API failed: {}", e);
    }

    // The API may also stop on its own error; make sure the pipeline follows
    if !shutdown.is_requested() {
        shutdown.request(ShutdownSignal::Requested);
    }

    graceful_shutdown(
        async {
            match pipeline_handle.await {
                Ok(stats) => info!("Pipeline final stats: {:?}", stats),
                Err(e) => error!("Pipeline task failed: {}", e),
            }
        },
        PIPELINE_STOP_TIMEOUT_SECS,
        "ingestion pipeline",
    )
    .await;

    postgres.close().await;
    info!("Shutdown complete");

    served.map_err(Into::into)
}
