use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use eyre::{Result, WrapErr, eyre};
use tracing_subscriber::{EnvFilter, fmt};

/// Routes `tracing` output to `path`; the terminal is owned by the dashboard.
/// Filter defaults to `info` and follows `RUST_LOG` when set.
pub fn init_logger(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| eyre!("install logger: {}", e))?;

    tracing::info!(log_file = %path.display(), "logger initialized");
    Ok(())
}
