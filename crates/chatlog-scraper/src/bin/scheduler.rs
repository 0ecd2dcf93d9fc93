//! `scheduler`: launch `scrape` every interval, retrying failed runs.
//!
//! Stops on SIGINT or SIGTERM. A run that is already in progress is left to
//! finish; only future runs are cancelled.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chatlog_scraper::{
  Settings,
  launcher::ProcessLauncher,
  scheduler::{Scheduler, SchedulerConfig},
};
use chatlog_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Run chat collection on a schedule")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "chatlog.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load settings from {:?}", cli.config))?;

  if let Some(parent) = settings.database_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&settings.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.database_path))?;

  let program = settings.scraper_path().context("failed to locate scrape binary")?;
  let launcher = ProcessLauncher::new(program)
    .with_args(["--config".to_owned(), cli.config.display().to_string()]);
  let scheduler = Scheduler::new(
    Arc::new(store.clone()),
    launcher,
    SchedulerConfig::from_settings(&settings),
  );

  let (stop_tx, stop_rx) = watch::channel(false);
  tokio::spawn(async move {
    shutdown_signal().await;
    tracing::info!("shutdown requested, finishing current run");
    let _ = stop_tx.send(true);
  });

  scheduler.run(stop_rx).await;

  store.close().await.context("failed to close store")?;
  tracing::info!("bye");
  Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!(error = %e, "failed to listen for ctrl-c");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = terminate => {}
  }
}
