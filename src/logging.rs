//! Tracing setup for the binary.
//!
//! Logs go to a daily rolling file under the data directory so they never
//! interleave with command output. `--verbose` switches to stderr instead.

use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer.
pub fn init(verbose: bool) -> Result<Option<WorkerGuard>> {
  let filter = env_filter(verbose);

  if verbose {
    tracing_subscriber::registry()
      .with(filter)
      .with(
        tracing_subscriber::fmt::layer()
          .with_writer(std::io::stderr)
          .with_target(true),
      )
      .try_init()
      .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    return Ok(None);
  }

  let dir = log_dir().ok_or_else(|| eyre!("Could not determine a data directory for logs"))?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "trellis.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::debug!(dir = %dir.display(), "logging initialized");
  Ok(Some(guard))
}

/// `TRELLIS_LOG` wins over `RUST_LOG`; without either, `info` (or `debug`
/// for this crate when verbose).
fn env_filter(verbose: bool) -> EnvFilter {
  EnvFilter::try_from_env("TRELLIS_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| {
      if verbose {
        EnvFilter::new("trellis=debug,info")
      } else {
        EnvFilter::new("info")
      }
    })
}

pub fn log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("trellis").join("logs"))
}
