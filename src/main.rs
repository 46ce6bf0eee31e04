//! Fraudwatch CLI
//!
//! `monitor`    - connect to the push feed and keep the reconciled views live
//! `simulate`   - run the fixed fraud-scenario catalogue once
//! `continuous` - emit random synthetic transactions until Ctrl-C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};

use fraudwatch::api::BackendClient;
use fraudwatch::models::Config;
use fraudwatch::monitor::{seed_from_backend, ConnectionState, MonitorHandle, StreamClient};
use fraudwatch::scenario::{build_catalogue, run_catalogue, ContinuousConfig, ContinuousGenerator};

#[derive(Parser, Debug)]
#[command(name = "fraudwatch")]
#[command(about = "Real-time fraud monitoring client and scenario driver")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect the stream client and log the reconciled state
    Monitor {
        /// Skip the startup snapshot fetch
        #[arg(long)]
        no_seed: bool,
    },

    /// Run the fixed scenario catalogue once
    Simulate,

    /// Emit pseudo-random transactions at a fixed interval
    Continuous {
        /// Seconds between transactions (overrides config)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fraudwatch=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("load configuration")?;

    match args.command {
        Commands::Monitor { no_seed } => run_monitor(config, no_seed).await,
        Commands::Simulate => run_simulate(config).await,
        Commands::Continuous { interval_secs } => run_continuous(config, interval_secs).await,
    }
}

async fn run_monitor(config: Config, no_seed: bool) -> Result<()> {
    let monitor = MonitorHandle::new(config.transaction_capacity, config.alert_capacity);

    if !no_seed {
        let api = BackendClient::new(&config.api_base)?;
        if let Err(e) = seed_from_backend(&monitor, &api).await {
            warn!(error = %e, "snapshot seed failed; starting from the push feed only");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (client, mut conn_rx) = StreamClient::new(
        config.ws_url.clone(),
        monitor.clone(),
        Duration::from_millis(config.highlight_ttl_ms),
        shutdown_rx,
    );

    let stream_task = tokio::spawn(client.run());

    // Surface connectivity transitions the way the dashboard indicator does.
    tokio::spawn(async move {
        while conn_rx.changed().await.is_ok() {
            match *conn_rx.borrow() {
                ConnectionState::Connecting => info!("connectivity: connecting"),
                ConnectionState::Open => info!("connectivity: connected to real-time service"),
                ConnectionState::Closed => warn!("connectivity: disconnected"),
            }
        }
    });

    // Periodic view summary.
    let summary_monitor = monitor.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            info!(
                transactions = summary_monitor.transaction_count(),
                alerts = summary_monitor.alert_count(),
                fraud_marked = summary_monitor.fraud_count(),
                "monitor view"
            );
        }
    });

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = stream_task.await;
    Ok(())
}

async fn run_simulate(config: Config) -> Result<()> {
    let api = BackendClient::new(&config.api_base)?;
    let outcomes = run_catalogue(&api, &build_catalogue()).await;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        submitted = outcomes.len() - failed,
        failed,
        "simulation complete; watch the dashboard for alerts"
    );
    Ok(())
}

async fn run_continuous(config: Config, interval_secs: Option<u64>) -> Result<()> {
    let api = BackendClient::new(&config.api_base)?;
    let continuous = ContinuousConfig {
        interval: interval_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_millis(config.continuous_interval_ms)),
        high_value_prob: config.high_value_prob,
        travel_prob: config.travel_prob,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let generator = tokio::spawn(ContinuousGenerator::new(api, continuous, shutdown_rx).run());

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = generator.await;
    Ok(())
}
