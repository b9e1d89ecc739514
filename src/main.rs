//! Trade Lifecycle - Main Entry Point
//!
//! Runs the decompose, monitor and end-of-day jobs on their schedules
//! until interrupted, or fires a single job with `--once`.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trade_lifecycle::config::load_config;
use trade_lifecycle::scheduler::log_outcome;
use trade_lifecycle::{
    InMemoryStore, JobKind, JobOutcome, MarketHours, RestPriceProvider, Scheduler, SystemClock,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text, json); overrides the config file
    #[arg(long)]
    log_format: Option<String>,

    /// Run one job (decompose, monitor, end_of_day) and exit
    #[arg(long)]
    once: Option<JobKind>,
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("trade_lifecycle={}", level.to_lowercase())))
        .context("invalid log level")?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let cfg = load_config(Some(&args.config)).context("failed to load configuration")?;

    let level = args.log_level.as_deref().unwrap_or(&cfg.settings.log_level);
    let format = args.log_format.as_deref().unwrap_or(&cfg.settings.log_format);
    init_tracing(level, format)?;

    info!("Starting trade lifecycle engine");
    info!("Configuration file: {}", args.config);

    let store = Arc::new(match &cfg.store.seed_file {
        Some(path) => InMemoryStore::from_json_file(path)?,
        None => InMemoryStore::new(),
    });
    let provider = Arc::new(RestPriceProvider::from_config(&cfg.price_feed)?);
    let hours = MarketHours::from_config(&cfg.market)?;
    info!(timezone = %hours.timezone(), open = %cfg.market.open, close = %cfg.market.close, "Market hours");

    let scheduler = Arc::new(Scheduler::build(
        &cfg,
        store.clone(),
        store,
        provider,
        Arc::new(SystemClock),
        Arc::new(hours),
    ));

    if let Some(kind) = args.once {
        let outcome = scheduler.run_job(kind).await;
        log_outcome(kind, &outcome);
        match outcome {
            JobOutcome::Completed(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            JobOutcome::Failed(reason) => anyhow::bail!("{} failed: {}", kind, reason),
            skipped => info!(job = %kind, outcome = ?skipped, "Nothing to do"),
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    info!("Application initialized successfully");

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    shutdown_tx.send(true).ok();
    runner.await?;

    Ok(())
}
