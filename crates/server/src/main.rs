//! gridcover server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use gridcover_core::config::AppConfig;
use gridcover_server::{bus, ingest, metrics, AppState};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// gridcover - radio coverage grid aggregation service
#[derive(Parser, Debug)]
#[command(name = "gridcoverd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "GRIDCOVER_CONFIG",
        default_value = "config/gridcover.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild coverage from raw history instead of consuming live events.
    Reprocess {
        /// Gateway ids to rebuild; every known gateway when omitted.
        gateway_ids: Vec<String>,
        /// Skip this many gateways, to resume an interrupted full rebuild.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gridcover v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    metrics::register_metrics();

    // Opening the store is the one startup step allowed to kill the
    // process; everything after degrades per unit of work instead.
    let store = gridcover_store::from_config(&config.store)
        .await
        .context("failed to open the aggregation store")?;
    store
        .health_check()
        .await
        .context("store health check failed")?;
    tracing::info!("Aggregation store ready");

    let state = AppState::new(config, store);

    match args.command {
        Some(Command::Reprocess {
            gateway_ids,
            offset,
        }) => run_reprocess(state, gateway_ids, offset).await,
        None => run_service(state).await,
    }
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {path}, using defaults and environment");
    }

    figment
        .merge(Env::prefixed("GRIDCOVER_").split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Operator-initiated rebuild; runs to completion and exits.
async fn run_reprocess(state: AppState, gateway_ids: Vec<String>, offset: usize) -> Result<()> {
    let summaries = if gateway_ids.is_empty() {
        tracing::info!(offset, "Rebuilding every known gateway");
        state.reprocess.rebuild_all(offset).await?
    } else {
        tracing::info!(gateways = gateway_ids.len(), "Rebuilding named gateways");
        state.reprocess.rebuild_gateways(&gateway_ids).await?
    };

    let cells: usize = summaries.iter().map(|summary| summary.cells_written).sum();
    let replayed: u64 = summaries
        .iter()
        .map(|summary| summary.observations_replayed)
        .sum();
    tracing::info!(
        antennas = summaries.len(),
        cells,
        replayed,
        "Reprocessing complete"
    );
    Ok(())
}

/// Continuous mode: bus consumers feeding the two worker loops.
async fn run_service(state: AppState) -> Result<()> {
    let queue_depth = state.config.aggregation.queue_depth;
    let (uplink_tx, uplink_rx) = mpsc::channel(queue_depth);
    let (moved_tx, moved_rx) = mpsc::channel(queue_depth);

    tokio::spawn(ingest::run_live_worker(uplink_rx, state.live.clone()));
    tokio::spawn(ingest::run_relocation_worker(moved_rx, state.reprocess.clone()));

    let amqp = state.config.amqp.clone();
    let uplink_consumer = tokio::spawn(bus::run_consumer(
        amqp.clone(),
        amqp.uplink_exchange.clone(),
        amqp.uplink_queue.clone(),
        uplink_tx,
    ));
    let moved_consumer = tokio::spawn(bus::run_consumer(
        amqp.clone(),
        amqp.moved_exchange.clone(),
        amqp.moved_queue.clone(),
        moved_tx,
    ));

    if state.config.metrics.enabled {
        let addr: SocketAddr = state
            .config
            .metrics
            .bind
            .parse()
            .context("invalid metrics bind address")?;
        let app = gridcover_server::create_router(state.clone());
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {addr}"))?;
        tracing::info!("Metrics listening on {addr}");
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(error = %error, "Metrics listener failed");
            }
        });
    }

    tracing::info!("Init complete");

    // A dead broker connection is fatal: the supervisor restarts us with a
    // clean subscription rather than letting events silently pile up.
    tokio::select! {
        result = uplink_consumer => consumer_exit("uplink", result),
        result = moved_consumer => consumer_exit("gateway-moved", result),
    }
}

fn consumer_exit(stream: &str, result: Result<lapin::Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => anyhow::bail!("{stream} consumer stopped unexpectedly"),
        Ok(Err(error)) => Err(error).with_context(|| format!("{stream} consumer failed")),
        Err(join_error) => {
            Err(join_error).with_context(|| format!("{stream} consumer task panicked"))
        }
    }
}
