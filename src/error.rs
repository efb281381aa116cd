use thiserror::Error;

/// Why a single poll produced no new data.
///
/// All variants are treated the same way by the dashboard: the last good
/// value stays on screen and the next tick tries again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::HttpStatus {
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return Self::Parse(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// A timestamp field that could not be turned into an instant.
///
/// Scoped to one field: the rest of the snapshot is still usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp missing")]
    Missing,

    #[error("malformed timestamp {raw:?}")]
    Malformed { raw: String },
}
