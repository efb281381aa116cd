//! Seconds remaining until the next expected refresh.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::CountdownMode;

#[derive(Debug, Clone)]
pub struct Countdown {
    mode: CountdownMode,
    interval: Duration,
    anchor: DateTime<Utc>,
    remaining_secs: u64,
}

impl Countdown {
    /// Starts counting down from `now`. `interval` must be non-zero.
    pub fn new(mode: CountdownMode, interval: Duration, now: DateTime<Utc>) -> Self {
        let mut countdown = Self {
            mode,
            interval,
            anchor: now,
            remaining_secs: 0,
        };
        countdown.tick(now);
        countdown
    }

    pub fn mode(&self) -> CountdownMode {
        self.mode
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Value computed by the most recent [`tick`](Self::tick).
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Upper bound of the displayed value: the interval in whole seconds,
    /// rounded up.
    pub fn max_secs(&self) -> u64 {
        ceil_secs(self.interval.as_millis() as u64)
    }

    /// Moves the anchor. A new snapshot arriving calls this with either the
    /// snapshot's own timestamp or the arrival time, depending on the mode.
    pub fn reset(&mut self, anchor: DateTime<Utc>, now: DateTime<Utc>) {
        self.anchor = anchor;
        self.tick(now);
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> u64 {
        self.remaining_secs = self.remaining_at(now);
        self.remaining_secs
    }

    fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let interval_ms = self.interval.as_millis() as u64;
        let elapsed_ms = (now - self.anchor).num_milliseconds();
        if elapsed_ms < 0 {
            // anchor ahead of the local clock
            return self.max_secs();
        }
        let left_ms = interval_ms.saturating_sub(elapsed_ms as u64);
        ceil_secs(left_ms).min(self.max_secs())
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
