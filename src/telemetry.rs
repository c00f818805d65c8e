//! Log setup.
//!
//! `GOSPREP_LOG` holds the filter directives (default `info`). Logs go to
//! `gosprep.log` in the data directory so stdout carries only command output.

use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "GOSPREP_LOG";
const LOG_FILE: &str = "gosprep.log";

/// Directory holding the log file.
pub fn log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("gosprep"))
}

/// Install the global subscriber. Keep the guard alive until exit or buffered
/// lines are lost.
pub fn init() -> Result<WorkerGuard> {
  let dir = log_dir().ok_or_else(|| eyre!("Could not determine data directory"))?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
