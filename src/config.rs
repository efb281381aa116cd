//! Configuration parameters for the ethfee dashboard
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use url::Url;

/// Poll cadence used when nothing else is configured
pub const REFRESH_INTERVAL_DEFAULT_MS: u64 = 10_000;

/// How long an up/down classification stays visible
pub const FLASH_DURATION: Duration = Duration::from_millis(1000);

/// Countdown recompute period
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// UI redraw / input poll period
pub const FRAME_PERIOD: Duration = Duration::from_millis(100);

pub const API_URL_DEFAULT: &str = "http://127.0.0.1:8000";

pub const GAS_PATH: &str = "/gas";
pub const EVENTS_PATH: &str = "/events";

// ========================= COST CONFIG =========================
/// Gas used by a plain ETH transfer
pub const ETH_TRANSFER_GAS: u64 = 21_000;
/// Gas used by a typical ERC-20 (USDT) transfer
pub const USDT_TRANSFER_GAS: u64 = 65_000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("api url must not be empty")]
    EmptyApiUrl,

    #[error("invalid api url {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("refresh interval must be greater than zero")]
    ZeroInterval,
}

/// Where the countdown takes its anchor from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CountdownMode {
    /// Anchored to the `last_updated` timestamp inside each gas snapshot.
    Snapshot,
    /// Anchored to the client clock when a new snapshot arrives.
    FreeRunning,
}

#[derive(Debug, Parser)]
#[command(name = "ethfee-dash", about = "Terminal dashboard for Ethereum gas fees")]
pub struct Args {
    /// API origin serving /gas and /events
    #[arg(long, env = "ETHFEE_API_URL", default_value = API_URL_DEFAULT)]
    pub api_url: String,

    /// Poll interval in milliseconds
    #[arg(long, env = "ETHFEE_REFRESH_MS", default_value_t = REFRESH_INTERVAL_DEFAULT_MS)]
    pub interval_ms: u64,

    /// Countdown anchoring mode
    #[arg(long, env = "ETHFEE_COUNTDOWN", value_enum, default_value_t = CountdownMode::Snapshot)]
    pub countdown: CountdownMode,

    /// Log destination (the terminal belongs to the dashboard)
    #[arg(long, env = "ETHFEE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Origin without trailing slash
    pub api_base: String,
    pub refresh_interval: Duration,
    pub countdown_mode: CountdownMode,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let api_base = normalize_api_base(&args.api_url)?;
        if args.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let log_file = args
            .log_file
            .unwrap_or_else(|| std::env::temp_dir().join("ethfee-dash.log"));

        Ok(Self {
            api_base,
            refresh_interval: Duration::from_millis(args.interval_ms),
            countdown_mode: args.countdown,
            log_file,
        })
    }
}

/// Strips one trailing slash and checks the origin is an absolute http(s) URL.
pub fn normalize_api_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyApiUrl);
    }
    let base = trimmed.strip_suffix('/').unwrap_or(trimmed);

    let parsed = Url::parse(base).map_err(|e| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidApiUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }

    Ok(base.to_string())
}
