//! Snapshots served by the fee API and their ingestion from JSON.
//!
//! Wire contract:
//! - `GET /gas` returns gwei figures as decimal strings, the base fee optionally
//!   suffixed with `" Gwei"`, and optional USD figures as numbers.
//! - `GET /events` returns `{"events": [...]}`; the canonical timestamp key is
//!   `timestamp`, `last_changed` is accepted as an alias.
//! - Timestamps without a UTC designator or offset are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{ETH_TRANSFER_GAS, USDT_TRANSFER_GAS};
use crate::error::{FetchError, TimestampError};
use crate::poller::Decode;

pub type Timestamp = Result<DateTime<Utc>, TimestampError>;

#[derive(Debug, Clone, PartialEq)]
pub struct GasSnapshot {
    pub safe_gwei: f64,
    pub propose_gwei: f64,
    pub fast_gwei: f64,
    pub base_fee_gwei: f64,
    pub last_block: u64,
    pub last_updated: Timestamp,
    pub eth_price_usd: Option<f64>,
    pub safe_transfer_usd: Option<f64>,
    pub propose_transfer_usd: Option<f64>,
    pub fast_transfer_usd: Option<f64>,
    /// Base-fee priced ETH transfer
    pub eth_transfer_usd: Option<f64>,
    /// Base-fee priced USDT transfer
    pub usdt_transfer_usd: Option<f64>,
}

/// Speed tier rows of the gas table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Safe,
    Propose,
    Fast,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Safe, Tier::Propose, Tier::Fast];

    pub fn label(self) -> &'static str {
        match self {
            Tier::Safe => "Safe",
            Tier::Propose => "Propose",
            Tier::Fast => "Fast",
        }
    }
}

impl GasSnapshot {
    pub fn gwei(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Safe => self.safe_gwei,
            Tier::Propose => self.propose_gwei,
            Tier::Fast => self.fast_gwei,
        }
    }

    /// ETH transfer cost for a tier. Falls back to pricing the tier's gwei
    /// figure locally when the server sent a price but no cost.
    pub fn eth_transfer_cost(&self, tier: Tier) -> Option<f64> {
        let served = match tier {
            Tier::Safe => self.safe_transfer_usd,
            Tier::Propose => self.propose_transfer_usd,
            Tier::Fast => self.fast_transfer_usd,
        };
        served.or_else(|| {
            self.eth_price_usd
                .map(|price| usd_cost(self.gwei(tier), price, ETH_TRANSFER_GAS))
        })
    }

    /// USDT transfer cost, scaled from the ETH transfer cost by gas usage.
    /// Only shown when an ETH price is known.
    pub fn usdt_transfer_cost(&self, tier: Tier) -> Option<f64> {
        self.eth_price_usd?;
        self.eth_transfer_cost(tier)
            .map(|eth_usd| eth_usd / ETH_TRANSFER_GAS as f64 * USDT_TRANSFER_GAS as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdState {
    Above,
    Below,
}

impl ThresholdState {
    pub fn label(self) -> &'static str {
        match self {
            ThresholdState::Above => "ABOVE",
            ThresholdState::Below => "BELOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub threshold_gwei: f64,
    pub state: ThresholdState,
    pub changed_at: Timestamp,
}

/// Events in the order the server returned them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventsSnapshot {
    pub events: Vec<EventRecord>,
}

// ========================= WIRE SHAPES =========================

#[derive(Debug, Deserialize)]
struct GasWire {
    safe: String,
    propose: String,
    fast: String,
    base_fee: String,
    last_block: String,
    last_updated: Option<String>,
    eth_price_usd: Option<f64>,
    eth_transfer_usd: Option<f64>,
    usdt_transfer_usd: Option<f64>,
    safe_transfer_usd: Option<f64>,
    propose_transfer_usd: Option<f64>,
    fast_transfer_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EventsWire {
    events: Vec<EventWire>,
}

#[derive(Debug, Deserialize)]
struct EventWire {
    threshold: f64,
    state: ThresholdState,
    #[serde(default, alias = "last_changed")]
    timestamp: Option<String>,
}

impl Decode for GasSnapshot {
    fn decode(value: Value) -> Result<Self, FetchError> {
        reject_upstream_error(&value)?;
        let wire: GasWire = serde_json::from_value(value)?;

        Ok(Self {
            safe_gwei: parse_gwei("safe", &wire.safe)?,
            propose_gwei: parse_gwei("propose", &wire.propose)?,
            fast_gwei: parse_gwei("fast", &wire.fast)?,
            base_fee_gwei: parse_gwei("base_fee", &wire.base_fee)?,
            last_block: wire
                .last_block
                .trim()
                .parse()
                .map_err(|_| FetchError::parse(format!("last_block: {:?}", wire.last_block)))?,
            last_updated: parse_timestamp(wire.last_updated.as_deref()),
            eth_price_usd: wire.eth_price_usd,
            safe_transfer_usd: wire.safe_transfer_usd,
            propose_transfer_usd: wire.propose_transfer_usd,
            fast_transfer_usd: wire.fast_transfer_usd,
            eth_transfer_usd: wire.eth_transfer_usd,
            usdt_transfer_usd: wire.usdt_transfer_usd,
        })
    }
}

impl Decode for EventsSnapshot {
    fn decode(value: Value) -> Result<Self, FetchError> {
        reject_upstream_error(&value)?;
        let wire: EventsWire = serde_json::from_value(value)?;

        let events = wire
            .events
            .into_iter()
            .map(|e| EventRecord {
                threshold_gwei: e.threshold,
                state: e.state,
                changed_at: parse_timestamp(e.timestamp.as_deref()),
            })
            .collect();
        Ok(Self { events })
    }
}

/// The API answers `{"error": "..."}` with a 200 before it has data.
fn reject_upstream_error(value: &Value) -> Result<(), FetchError> {
    match value.get("error").and_then(Value::as_str) {
        Some(msg) => Err(FetchError::parse(format!("upstream: {}", msg))),
        None => Ok(()),
    }
}

/// Parses a gwei decimal string, tolerating a trailing `Gwei` unit.
pub fn parse_gwei(field: &str, raw: &str) -> Result<f64, FetchError> {
    let trimmed = raw.trim();
    let number = trimmed
        .strip_suffix("Gwei")
        .or_else(|| trimmed.strip_suffix("gwei"))
        .unwrap_or(trimmed)
        .trim_end();

    match number.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FetchError::parse(format!("{}: {:?} is not a decimal", field, raw))),
    }
}

/// Reads an ISO-8601 instant. A value without designator is taken as UTC.
pub fn parse_timestamp(raw: Option<&str>) -> Timestamp {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Err(TimestampError::Missing),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| TimestampError::Malformed {
            raw: raw.to_string(),
        })
}

/// USD cost of `gas_limit` units at `gwei`, rounded to 4 decimals.
pub fn usd_cost(gwei: f64, eth_price_usd: f64, gas_limit: u64) -> f64 {
    let eth = gwei * gas_limit as f64 / 1e9;
    (eth * eth_price_usd * 10_000.0).round() / 10_000.0
}

/// Gwei with precision scaled to magnitude.
pub fn fmt_gwei(v: f64) -> String {
    if v >= 10.0 {
        format!("{:.1}", v)
    } else if v >= 1.0 {
        format!("{:.2}", v)
    } else if v >= 0.1 {
        format!("{:.3}", v)
    } else {
        format!("{:.4}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn gas_body() -> Value {
        json!({
            "safe": "25.1000",
            "propose": "26.5",
            "fast": "30.2000",
            "base_fee": "24.9 Gwei",
            "last_block": "19000000",
            "last_updated": "2024-01-01T00:00:00Z",
            "eth_price_usd": 2000.0,
            "safe_transfer_usd": 1.0542
        })
    }

    #[test]
    fn decodes_gas_snapshot() {
        let gas = GasSnapshot::decode(gas_body()).unwrap();
        assert_eq!(gas.safe_gwei, 25.1);
        assert_eq!(gas.fast_gwei, 30.2);
        assert_eq!(gas.base_fee_gwei, 24.9);
        assert_eq!(gas.last_block, 19_000_000);
        assert_eq!(
            gas.last_updated,
            Ok(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(gas.eth_price_usd, Some(2000.0));
        assert_eq!(gas.fast_transfer_usd, None);
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let mut body = gas_body();
        body.as_object_mut().unwrap().remove("fast");
        assert!(matches!(
            GasSnapshot::decode(body),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn non_decimal_gwei_is_parse_error() {
        let mut body = gas_body();
        body["safe"] = json!("cheap");
        let err = GasSnapshot::decode(body).unwrap_err();
        assert!(err.to_string().contains("safe"));
    }

    #[test]
    fn upstream_error_body_is_parse_error() {
        let err = GasSnapshot::decode(json!({"error": "Gas data not available yet"})).unwrap_err();
        assert_eq!(
            err,
            FetchError::Parse("upstream: Gas data not available yet".into())
        );
    }

    #[test]
    fn malformed_timestamp_only_fails_that_field() {
        let mut body = gas_body();
        body["last_updated"] = json!("yesterday-ish");
        let gas = GasSnapshot::decode(body).unwrap();
        assert_eq!(
            gas.last_updated,
            Err(TimestampError::Malformed {
                raw: "yesterday-ish".into()
            })
        );
        assert_eq!(gas.fast_gwei, 30.2);
    }

    #[test]
    fn timestamp_without_designator_is_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp(Some("2024-01-01T00:00:00")), Ok(expected));
        assert_eq!(parse_timestamp(Some("2024-01-01T00:00:00Z")), Ok(expected));
        assert_eq!(
            parse_timestamp(Some("2024-01-01T02:00:00+02:00")),
            Ok(expected)
        );
        assert_eq!(
            parse_timestamp(Some("2024-01-01T00:00:00.250")).map(|t| t.timestamp_millis()),
            Ok(expected.timestamp_millis() + 250)
        );
        assert_eq!(parse_timestamp(None), Err(TimestampError::Missing));
        assert_eq!(parse_timestamp(Some("")), Err(TimestampError::Missing));
    }

    #[test]
    fn decodes_events_in_server_order_with_either_timestamp_key() {
        let body = json!({
            "events": [
                {"threshold": 50, "state": "above", "timestamp": "2024-01-01T00:00:00"},
                {"threshold": 20.0, "state": "below", "last_changed": "2024-01-02T00:00:00Z"},
                {"threshold": 8, "state": "below", "last_changed": null}
            ]
        });
        let events = EventsSnapshot::decode(body).unwrap().events;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].threshold_gwei, 50.0);
        assert_eq!(events[0].state, ThresholdState::Above);
        assert_eq!(
            events[0].changed_at,
            Ok(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(events[1].state, ThresholdState::Below);
        assert!(events[1].changed_at.is_ok());
        assert_eq!(events[2].changed_at, Err(TimestampError::Missing));
    }

    #[test]
    fn unknown_event_state_is_parse_error() {
        let body = json!({"events": [{"threshold": 5, "state": "sideways", "timestamp": null}]});
        assert!(matches!(
            EventsSnapshot::decode(body),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn usd_columns() {
        let gas = GasSnapshot::decode(gas_body()).unwrap();
        // served value wins
        assert_eq!(gas.eth_transfer_cost(Tier::Safe), Some(1.0542));
        // derived: 30.2 gwei * 21000 / 1e9 * 2000
        assert_eq!(gas.eth_transfer_cost(Tier::Fast), Some(1.2684));
        let usdt = gas.usdt_transfer_cost(Tier::Safe).unwrap();
        assert!((usdt - 1.0542 / 21_000.0 * 65_000.0).abs() < 1e-9);

        let mut no_price = gas.clone();
        no_price.eth_price_usd = None;
        assert_eq!(no_price.usdt_transfer_cost(Tier::Safe), None);
        assert_eq!(no_price.eth_transfer_cost(Tier::Fast), None);
    }

    #[test]
    fn gwei_formatting_scales_with_magnitude() {
        assert_eq!(fmt_gwei(35.0), "35.0");
        assert_eq!(fmt_gwei(2.346), "2.35");
        assert_eq!(fmt_gwei(0.5), "0.500");
        assert_eq!(fmt_gwei(0.01234), "0.0123");
        assert_eq!(parse_gwei("base_fee", "12.5 Gwei").unwrap(), 12.5);
    }
}
