//! venuehold server binary.
//!
//! Reads `venuehold.toml` (or the path specified with `--config`), opens the
//! SQLite store and either serves the JSON API or runs a single expiration
//! sweep.
//!
//! # Scheduling sweeps externally
//!
//! Set `sweep_interval_secs = 0` and run the one-shot pass from cron:
//!
//! ```text
//! */5 * * * * venuehold --config /etc/venuehold.toml sweep
//! ```

mod settings;

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::Router;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::{
  net::TcpListener,
  sync::{broadcast, watch},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use venuehold_core::event::EngineEvent;
use venuehold_engine::{BroadcastDispatcher, Engine};
use venuehold_store_sqlite::SqliteStore;

use crate::settings::ServerConfig;

type ServerEngine = Engine<SqliteStore, BroadcastDispatcher>;

#[derive(Parser)]
#[command(author, version, about = "Venue hold and waiting-queue server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "venuehold.toml")]
  config: std::path::PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API, sweeping on the configured interval.
  Serve,
  /// Run one expiration sweep, print the report as JSON and exit.
  Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let store_path = cfg.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = Arc::new(Engine::new(
    Arc::new(store),
    Arc::new(BroadcastDispatcher::new()),
    cfg.engine.clone(),
  ));

  match cli.command {
    Command::Serve => serve(engine, &cfg).await,
    Command::Sweep => sweep_once(engine).await,
  }
}

// ─── Serve ────────────────────────────────────────────────────────────────────

async fn serve(engine: Arc<ServerEngine>, cfg: &ServerConfig) -> anyhow::Result<()> {
  tokio::spawn(log_events(engine.dispatcher().subscribe()));

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let sweeper = (cfg.sweep_interval_secs > 0).then(|| {
    tokio::spawn(run_sweeps(
      engine.clone(),
      Duration::from_secs(cfg.sweep_interval_secs),
      shutdown_rx,
    ))
  });

  let app = Router::new()
    .merge(venuehold_api::api_router(engine))
    .layer(TraceLayer::new_for_http());

  let address = cfg.address();
  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
      }
      info!("shutting down");
      let _ = shutdown_tx.send(true);
    })
    .await
    .context("server error")?;

  if let Some(handle) = sweeper {
    handle.await.context("sweep task panicked")?;
  }
  Ok(())
}

/// Sweep every `period` until `shutdown` flips.
async fn run_sweeps(
  engine: Arc<ServerEngine>,
  period: Duration,
  mut shutdown: watch::Receiver<bool>,
) {
  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = shutdown.changed() => break,
    }

    match engine.sweep(Utc::now()).await {
      Ok(report) => debug!(
        expired = report.expired_count(),
        notified = report.notified.len(),
        notify_failed = report.notify_failed.len(),
        reminders = report.reminders.len(),
        "scheduled sweep finished"
      ),
      // Transient store failures are retried on the next tick.
      Err(e) => warn!(error = %e, "scheduled sweep failed"),
    }
    engine.dispatcher().prune();
  }
}

// ─── Sweep ────────────────────────────────────────────────────────────────────

async fn sweep_once(engine: Arc<ServerEngine>) -> anyhow::Result<()> {
  let mut events = engine.dispatcher().subscribe();
  let report = engine.sweep(Utc::now()).await.context("sweep failed")?;

  while let Ok(event) = events.try_recv() {
    info!(
      event = event.name(),
      recipient = %event.recipient(),
      "event dispatched"
    );
  }

  println!(
    "{}",
    serde_json::to_string_pretty(&report).context("failed to encode report")?
  );
  Ok(())
}

// ─── Events ───────────────────────────────────────────────────────────────────

/// Stand-in for real delivery: log every event the engine raises.
async fn log_events(mut events: broadcast::Receiver<EngineEvent>) {
  loop {
    match events.recv().await {
      Ok(event) => info!(
        event = event.name(),
        recipient = %event.recipient(),
        payload = ?event,
        "event dispatched"
      ),
      Err(broadcast::error::RecvError::Lagged(missed)) => {
        warn!(missed, "event log fell behind");
      }
      Err(broadcast::error::RecvError::Closed) => break,
    }
  }
}
