//! Console log output for the `scrape` binary.
//!
//! When launched by the scheduler or the API, stdout is a pipe whose tail
//! ends up in the run's stored log text, so colour codes are only emitted to
//! a terminal.

use std::io::IsTerminal as _;

use tracing::Subscriber;
use tracing_subscriber::{Layer, fmt::MakeWriter, registry::LookupSpan};

/// Human-readable layer on stdout, coloured only when stdout is a terminal.
pub fn console_layer<S>() -> impl Layer<S>
where
  S: Subscriber + for<'a> LookupSpan<'a>,
{
  console_layer_with(std::io::stdout, std::io::stdout().is_terminal())
}

fn console_layer_with<S, W>(writer: W, ansi: bool) -> impl Layer<S>
where
  S: Subscriber + for<'a> LookupSpan<'a>,
  W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
  tracing_subscriber::fmt::layer().with_ansi(ansi).with_writer(writer)
}
