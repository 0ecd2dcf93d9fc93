//! Browser-driven collection of chat messages.
//!
//! The pieces, leaf first:
//!
//! - [`config`]: layered [`Settings`] (TOML file + `CHATLOG_*` environment).
//! - [`artifacts`]: per-run directories and files (export, frames, trace).
//! - [`session`] / [`webdriver`]: the browser seam and its W3C WebDriver
//!   implementation.
//! - [`strategy`]: how a chat client's DOM is opened, scrolled, and read.
//! - [`lifecycle`]: one scrape run, from `running` to a final status.
//! - [`launcher`] / [`scheduler`]: run the `scrape` binary on a timer with
//!   bounded retries.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod incremental;
pub mod launcher;
pub mod lifecycle;
pub mod logging;
pub mod recorder;
pub mod scheduler;
pub mod session;
pub mod strategy;
pub mod webdriver;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use error::{Error, Result};
pub use lifecycle::{RunController, RunReport};
