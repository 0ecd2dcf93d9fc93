//! `scrape`: one collection run.
//!
//! Opens a browser through WebDriver, collects every active target for the
//! profile, saves the results, and exits `0` on success or `1` on failure.
//! Normally launched by the scheduler or the API's trigger endpoint; can be
//! run by hand:
//!
//! ```text
//! cargo run -p chatlog-scraper --bin scrape -- --profile large --headless true
//! ```

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use chatlog_core::{
  profile::Profile,
  run::{RunId, RunStatus},
};
use chatlog_scraper::{
  RunController, Settings,
  artifacts::ArtifactStore,
  lifecycle::RunOptions,
  logging,
  strategy::DomStrategy,
  webdriver::WebDriverClient,
};
use chatlog_store_sqlite::SqliteStore;
use chrono::Utc;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser)]
#[command(author, version, about = "Collect chat messages in one browser session")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "chatlog.toml")]
  config: PathBuf,

  /// Identifier to record the run under; generated when omitted.
  #[arg(long)]
  run_id: Option<String>,

  /// Viewport profile (small, medium, large).
  #[arg(long)]
  profile: Option<Profile>,

  /// Run the browser without a window.
  #[arg(long)]
  headless: Option<bool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load settings from {:?}", cli.config))?;
  let profile = cli.profile.unwrap_or(settings.profile);
  let headless = cli.headless.unwrap_or(settings.headless);
  let run_id = match cli.run_id.as_deref() {
    Some(id) => RunId::parse(id).context("invalid --run-id")?,
    None => RunId::generate(profile, Utc::now()),
  };

  // Console output for whoever launched us, plus a JSON log file per run.
  let artifacts = ArtifactStore::from_settings(&settings);
  std::fs::create_dir_all(artifacts.logs_dir())
    .with_context(|| format!("failed to create {:?}", artifacts.logs_dir()))?;
  let log_file = tracing_appender::rolling::never(
    artifacts.logs_dir(),
    format!("{run_id}.log"),
  );
  let (log_writer, _log_guard) = tracing_appender::non_blocking(log_file);

  tracing_subscriber::registry()
    .with(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with(logging::console_layer())
    .with(
      tracing_subscriber::fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(log_writer),
    )
    .init();

  if let Some(parent) = settings.database_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&settings.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.database_path))?;
  let store = Arc::new(store);

  let driver = WebDriverClient::new(&settings.webdriver_url)
    .context("failed to build WebDriver client")?;
  let strategy = DomStrategy::from_settings(&settings);
  let controller = RunController::new(store.clone(), driver, strategy, settings);

  let report = controller
    .run(RunOptions { run_id, profile, headless })
    .await;

  drop(controller);
  if let Err(e) = store.as_ref().clone().close().await {
    tracing::warn!(error = %e, "failed to close store");
  }

  match report.status {
    RunStatus::Success => Ok(ExitCode::SUCCESS),
    _ => Ok(ExitCode::FAILURE),
  }
}
