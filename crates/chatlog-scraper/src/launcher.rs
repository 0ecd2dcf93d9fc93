//! Running the scraper as a child process.

use std::{
  collections::VecDeque,
  future::Future,
  path::PathBuf,
  process::Stdio,
  sync::{Arc, Mutex},
};

use chatlog_core::{profile::Profile, run::RunId};
use tokio::{
  io::{AsyncBufReadExt as _, AsyncRead, BufReader},
  process::Command,
};

use crate::{Error, Result};

/// Lines of child output kept as the run's captured log.
pub const DEFAULT_TAIL_LINES: usize = 2000;

#[derive(Debug, Clone)]
pub struct LaunchRequest {
  pub run_id:   RunId,
  pub profile:  Profile,
  pub headless: bool,
}

/// How a launched scrape ended.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
  pub success:   bool,
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  /// The last lines of combined stdout/stderr.
  pub log_tail:  String,
}

/// Starts a scrape run and waits for it to finish.
pub trait RunLauncher: Send + Sync {
  fn launch(
    &self,
    request: LaunchRequest,
  ) -> impl Future<Output = Result<LaunchOutcome>> + Send + '_;
}

/// Launches the `scrape` binary.
///
/// Children are never killed: dropping the launch future leaves the process
/// running to completion.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
  program:    PathBuf,
  args:       Vec<String>,
  tail_lines: usize,
}

impl ProcessLauncher {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program:    program.into(),
      args:       Vec::new(),
      tail_lines: DEFAULT_TAIL_LINES,
    }
  }

  /// Arguments placed before the per-run flags (e.g. `--config <path>`).
  pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn with_tail_lines(mut self, lines: usize) -> Self {
    self.tail_lines = lines.max(1);
    self
  }
}

type Tail = Arc<Mutex<VecDeque<String>>>;

/// Log each line of `reader` and keep the newest `limit` lines in `tail`.
fn forward<R>(
  reader: R,
  stream: &'static str,
  run_id: RunId,
  tail: Tail,
  limit: usize,
) -> tokio::task::JoinHandle<()>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut lines = BufReader::new(reader).lines();
    loop {
      match lines.next_line().await {
        Ok(Some(line)) => {
          tracing::info!(run_id = %run_id, stream, "{line}");
          if let Ok(mut tail) = tail.lock() {
            if tail.len() == limit {
              tail.pop_front();
            }
            tail.push_back(line);
          }
        }
        Ok(None) => break,
        Err(e) => {
          tracing::warn!(run_id = %run_id, stream, error = %e, "failed reading child output");
          break;
        }
      }
    }
  })
}

impl RunLauncher for ProcessLauncher {
  async fn launch(&self, request: LaunchRequest) -> Result<LaunchOutcome> {
    let mut command = Command::new(&self.program);
    command
      .args(&self.args)
      .arg("--run-id")
      .arg(request.run_id.as_str())
      .arg("--profile")
      .arg(request.profile.as_str())
      .arg("--headless")
      .arg(request.headless.to_string())
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(false);
    // Own process group: a terminal Ctrl-C reaches the scheduler, not the run.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| {
      Error::Launch(format!("failed to start {}: {e}", self.program.display()))
    })?;
    tracing::info!(
      run_id = %request.run_id,
      pid = child.id(),
      program = %self.program.display(),
      "scraper started"
    );

    let tail: Tail = Arc::new(Mutex::new(VecDeque::with_capacity(self.tail_lines)));
    let mut readers = Vec::new();
    if let Some(out) = child.stdout.take() {
      readers.push(forward(out, "stdout", request.run_id.clone(), tail.clone(), self.tail_lines));
    }
    if let Some(err) = child.stderr.take() {
      readers.push(forward(err, "stderr", request.run_id.clone(), tail.clone(), self.tail_lines));
    }

    let status = child.wait().await?;
    for reader in readers {
      let _ = reader.await;
    }

    let log_tail = tail
      .lock()
      .map(|lines| lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
      .unwrap_or_default();

    tracing::info!(run_id = %request.run_id, %status, "scraper exited");
    Ok(LaunchOutcome {
      success: status.success(),
      exit_code: status.code(),
      log_tail,
    })
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  fn request() -> LaunchRequest {
    LaunchRequest {
      run_id:   RunId::parse("run_launch_test").unwrap(),
      profile:  Profile::Large,
      headless: true,
    }
  }

  fn shell(script: &str) -> ProcessLauncher {
    ProcessLauncher::new("sh").with_args(["-c", script, "scrape"])
  }

  #[tokio::test]
  async fn passes_run_flags_and_captures_output() {
    let outcome = shell(r#"echo "args: $*"; echo warn >&2"#)
      .launch(request())
      .await
      .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.exit_code, Some(0));
    assert!(
      outcome
        .log_tail
        .contains("args: --run-id run_launch_test --profile large --headless true")
    );
    assert!(outcome.log_tail.contains("warn"));
  }

  #[tokio::test]
  async fn reports_non_zero_exit() {
    let outcome = shell("echo failing; exit 3").launch(request()).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.log_tail, "failing");
  }

  #[tokio::test]
  async fn keeps_only_the_last_lines() {
    let outcome = shell("for i in 1 2 3 4 5 6 7 8; do echo line$i; done")
      .with_tail_lines(3)
      .launch(request())
      .await
      .unwrap();
    assert_eq!(outcome.log_tail, "line6\nline7\nline8");
  }

  #[cfg(target_os = "linux")]
  #[tokio::test]
  async fn child_runs_in_its_own_process_group() {
    let outcome = shell(
      r#"read -r _ _ _ _ pgrp _ < /proc/$$/stat; [ "$pgrp" = "$$" ] && echo own-group || echo shared-group"#,
    )
    .launch(request())
    .await
    .unwrap();
    assert_eq!(outcome.log_tail, "own-group");
  }

  #[tokio::test]
  async fn spawn_error_is_a_launch_error() {
    let err = ProcessLauncher::new("/nonexistent/chatlog-scrape")
      .launch(request())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Launch(_)));
  }
}
