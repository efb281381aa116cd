//! Dashboard state owned by one view: the two polled resources, the
//! per-field flash tracker and the refresh countdown.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{COUNTDOWN_TICK, CountdownMode};
use crate::countdown::Countdown;
use crate::delta::{Classification, DeltaTracker};
use crate::error::FetchError;
use crate::model::{EventsSnapshot, GasSnapshot, Tier, Timestamp};
use crate::poller::ResourceState;

/// Gas figures that get a flash on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasField {
    Safe,
    Propose,
    Fast,
    BaseFee,
}

impl From<Tier> for GasField {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Safe => GasField::Safe,
            Tier::Propose => GasField::Propose,
            Tier::Fast => GasField::Fast,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Refreshing,
    Error(String),
    NextRefresh(u64),
}

pub struct App {
    gas_rx: watch::Receiver<ResourceState<GasSnapshot>>,
    events_rx: watch::Receiver<ResourceState<EventsSnapshot>>,
    gas: ResourceState<GasSnapshot>,
    events: ResourceState<EventsSnapshot>,
    deltas: DeltaTracker<GasField>,
    countdown: Countdown,
    /// `last_updated` of the snapshot the countdown was last anchored to
    anchored_to: Option<Timestamp>,
    last_countdown_tick: Option<Instant>,
    now: Instant,
    pub api_base: String,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        gas_rx: watch::Receiver<ResourceState<GasSnapshot>>,
        events_rx: watch::Receiver<ResourceState<EventsSnapshot>>,
        countdown: Countdown,
        api_base: String,
    ) -> Self {
        Self {
            gas_rx,
            events_rx,
            gas: ResourceState::default(),
            events: ResourceState::default(),
            deltas: DeltaTracker::new(),
            countdown,
            anchored_to: None,
            last_countdown_tick: None,
            now: Instant::now(),
            api_base,
            should_quit: false,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Pulls whatever the pollers published since the last call, feeds new
    /// gas values to the flash tracker and advances the countdown.
    pub fn sync(&mut self, now: Instant, wall: DateTime<Utc>) {
        self.now = now;

        if matches!(self.events_rx.has_changed(), Ok(true)) {
            self.events = self.events_rx.borrow_and_update().clone();
        }

        if matches!(self.gas_rx.has_changed(), Ok(true)) {
            let next = self.gas_rx.borrow_and_update().clone();
            let arrived = match (&self.gas.latest_value, &next.latest_value) {
                (Some(old), Some(new)) => !Arc::ptr_eq(old, new),
                (None, Some(_)) => true,
                _ => false,
            };
            let snapshot = next.latest_value.clone();
            self.gas = next;
            if let (true, Some(snapshot)) = (arrived, snapshot) {
                self.on_gas_snapshot(&snapshot, now, wall);
            }
        }

        let due = self
            .last_countdown_tick
            .map(|t| now.duration_since(t) >= COUNTDOWN_TICK)
            .unwrap_or(true);
        if due {
            self.countdown.tick(wall);
            self.last_countdown_tick = Some(now);
        }
    }

    fn on_gas_snapshot(&mut self, gas: &GasSnapshot, now: Instant, wall: DateTime<Utc>) {
        for tier in Tier::ALL {
            self.deltas.observe(tier.into(), gas.gwei(tier), now);
        }
        let base = self.deltas.observe(GasField::BaseFee, gas.base_fee_gwei, now);
        debug!(block = gas.last_block, base_fee = gas.base_fee_gwei, ?base, "gas snapshot");

        // Only a snapshot the server actually refreshed moves the anchor.
        let fresh = match (&self.anchored_to, &gas.last_updated) {
            (Some(Ok(prev)), Ok(cur)) => prev != cur,
            _ => true,
        };
        if !fresh {
            return;
        }
        let anchor = match (self.countdown.mode(), &gas.last_updated) {
            (CountdownMode::Snapshot, Ok(ts)) => *ts,
            _ => wall,
        };
        self.countdown.reset(anchor, wall);
        self.last_countdown_tick = Some(now);
        self.anchored_to = Some(gas.last_updated.clone());
        info!(
            block = gas.last_block,
            anchor = %anchor,
            remaining = self.countdown.remaining_secs(),
            "countdown re-anchored"
        );
    }

    pub fn gas(&self) -> Option<&GasSnapshot> {
        self.gas.latest_value.as_deref()
    }

    pub fn events(&self) -> Option<&EventsSnapshot> {
        self.events.latest_value.as_deref()
    }

    pub fn gas_state(&self) -> &ResourceState<GasSnapshot> {
        &self.gas
    }

    pub fn events_state(&self) -> &ResourceState<EventsSnapshot> {
        &self.events
    }

    /// Flash state of a gas figure as of the last [`sync`](Self::sync).
    pub fn flash(&self, field: GasField) -> Classification {
        self.deltas.classification(&field, self.now)
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn status(&self) -> Status {
        if self.gas.is_loading() || self.events.is_loading() {
            return Status::Refreshing;
        }
        if let Some(err) = self.error() {
            return Status::Error(err.to_string());
        }
        Status::NextRefresh(self.countdown.remaining_secs())
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.gas
            .last_error
            .as_ref()
            .or(self.events.last_error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;
    use std::time::Duration;

    fn gas(fast: f64, last_updated: &str) -> GasSnapshot {
        GasSnapshot {
            safe_gwei: 20.0,
            propose_gwei: 22.0,
            fast_gwei: fast,
            base_fee_gwei: 19.5,
            last_block: 1,
            last_updated: parse_timestamp(Some(last_updated)),
            eth_price_usd: None,
            safe_transfer_usd: None,
            propose_transfer_usd: None,
            fast_transfer_usd: None,
            eth_transfer_usd: None,
            usdt_transfer_usd: None,
        }
    }

    struct Harness {
        gas_tx: watch::Sender<ResourceState<GasSnapshot>>,
        _events_tx: watch::Sender<ResourceState<EventsSnapshot>>,
        app: App,
        seq: u64,
    }

    impl Harness {
        fn new(mode: CountdownMode, wall: DateTime<Utc>) -> Self {
            let (gas_tx, gas_rx) = watch::channel(ResourceState::default());
            let (events_tx, events_rx) = watch::channel(ResourceState::default());
            let countdown = Countdown::new(mode, Duration::from_secs(10), wall);
            Self {
                gas_tx,
                _events_tx: events_tx,
                app: App::new(gas_rx, events_rx, countdown, "http://test".into()),
                seq: 0,
            }
        }

        fn publish(&mut self, outcome: Result<GasSnapshot, FetchError>) {
            self.seq += 1;
            let seq = self.seq;
            self.gas_tx.send_modify(|s| {
                s.begin();
                s.apply(seq, outcome);
            });
        }
    }

    fn wall(s: &str) -> DateTime<Utc> {
        parse_timestamp(Some(s)).unwrap()
    }

    #[test]
    fn fast_increase_flashes_for_one_second() {
        let t0 = Instant::now();
        let mut h = Harness::new(CountdownMode::Snapshot, wall("2024-01-01T00:00:00Z"));

        h.publish(Ok(gas(25.1, "2024-01-01T00:00:00Z")));
        h.app.sync(t0, wall("2024-01-01T00:00:00Z"));
        assert_eq!(h.app.flash(GasField::Fast), Classification::None);

        let t1 = t0 + Duration::from_secs(10);
        h.publish(Ok(gas(30.2, "2024-01-01T00:00:10Z")));
        h.app.sync(t1, wall("2024-01-01T00:00:10Z"));
        assert_eq!(h.app.flash(GasField::Fast), Classification::Up);
        assert_eq!(h.app.flash(GasField::Safe), Classification::None);

        h.app.sync(t1 + Duration::from_millis(999), wall("2024-01-01T00:00:10Z"));
        assert_eq!(h.app.flash(GasField::Fast), Classification::Up);
        h.app.sync(t1 + Duration::from_millis(1000), wall("2024-01-01T00:00:11Z"));
        assert_eq!(h.app.flash(GasField::Fast), Classification::None);
    }

    #[test]
    fn failed_poll_keeps_value_and_flash_state() {
        let t0 = Instant::now();
        let mut h = Harness::new(CountdownMode::Snapshot, wall("2024-01-01T00:00:00Z"));
        h.publish(Ok(gas(25.0, "2024-01-01T00:00:00Z")));
        h.app.sync(t0, wall("2024-01-01T00:00:00Z"));

        h.publish(Err(FetchError::HttpStatus { status: 503 }));
        h.app.sync(t0 + Duration::from_secs(10), wall("2024-01-01T00:00:10Z"));
        assert_eq!(h.app.gas().map(|g| g.fast_gwei), Some(25.0));
        assert_eq!(h.app.status(), Status::Error("HTTP 503".into()));
        assert_eq!(h.app.flash(GasField::Fast), Classification::None);
    }

    #[test]
    fn repeated_value_does_not_flash() {
        let t0 = Instant::now();
        let mut h = Harness::new(CountdownMode::Snapshot, wall("2024-01-01T00:00:00Z"));
        h.publish(Ok(gas(25.0, "2024-01-01T00:00:00Z")));
        h.app.sync(t0, wall("2024-01-01T00:00:00Z"));
        h.publish(Ok(gas(25.0, "2024-01-01T00:00:00Z")));
        h.app.sync(t0 + Duration::from_secs(10), wall("2024-01-01T00:00:10Z"));
        assert_eq!(h.app.flash(GasField::Fast), Classification::None);
    }

    #[test]
    fn snapshot_mode_anchors_on_server_timestamp() {
        let t0 = Instant::now();
        let mut h = Harness::new(CountdownMode::Snapshot, wall("2024-01-01T00:00:00Z"));
        // stamped 3s before it is observed
        h.publish(Ok(gas(25.0, "2024-01-01T00:00:07Z")));
        h.app.sync(t0, wall("2024-01-01T00:00:10Z"));
        assert_eq!(h.app.countdown().remaining_secs(), 7);
        assert_eq!(h.app.status(), Status::NextRefresh(7));
    }

    #[test]
    fn free_running_mode_anchors_on_arrival_and_ignores_unchanged_stamp() {
        let t0 = Instant::now();
        let mut h = Harness::new(CountdownMode::FreeRunning, wall("2024-01-01T00:00:00Z"));
        h.publish(Ok(gas(25.0, "2024-01-01T00:00:07Z")));
        h.app.sync(t0, wall("2024-01-01T00:00:10Z"));
        assert_eq!(h.app.countdown().remaining_secs(), 10);

        // same server stamp again: anchor stays, countdown keeps running down
        h.publish(Ok(gas(26.0, "2024-01-01T00:00:07Z")));
        h.app.sync(t0 + Duration::from_secs(4), wall("2024-01-01T00:00:14Z"));
        assert_eq!(h.app.countdown().remaining_secs(), 6);
        assert_eq!(h.app.flash(GasField::Fast), Classification::Up);
    }

    #[test]
    fn loading_state_wins_over_countdown() {
        let mut h = Harness::new(CountdownMode::Snapshot, wall("2024-01-01T00:00:00Z"));
        h.gas_tx.send_modify(|s| s.begin());
        h.app.sync(Instant::now(), wall("2024-01-01T00:00:00Z"));
        assert_eq!(h.app.status(), Status::Refreshing);
    }
}
