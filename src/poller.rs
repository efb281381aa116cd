//! Fixed-cadence poller for one API resource
//!
//! Every tick issues a fetch tagged with an increasing sequence number. Fetches
//! may overlap; an outcome is only applied if no later poll has been applied
//! already, so a slow response can never overwrite fresher data. Failures keep
//! the last good value and never stop the schedule.
//!
//! Dropping the [`PollHandle`] aborts the schedule together with every fetch
//! still in flight; nothing is applied after teardown.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::api::Fetch;
use crate::error::FetchError;

/// Conversion from a fetched JSON document into a typed snapshot.
pub trait Decode: Sized + Send + Sync + 'static {
    fn decode(value: Value) -> Result<Self, FetchError>;
}

impl Decode for Value {
    fn decode(value: Value) -> Result<Self, FetchError> {
        Ok(value)
    }
}

/// Observable state of one polled resource.
#[derive(Debug)]
pub struct ResourceState<T> {
    /// Last successfully decoded value
    pub latest_value: Option<Arc<T>>,
    pub last_error: Option<FetchError>,
    /// Requests currently in flight
    pub in_flight: usize,
    pub successes: u64,
    pub failures: u64,
    /// Outcomes dropped because a later poll had already been applied
    pub discarded: u64,
    applied_seq: u64,
}

impl<T> Clone for ResourceState<T> {
    fn clone(&self) -> Self {
        Self {
            latest_value: self.latest_value.clone(),
            last_error: self.last_error.clone(),
            in_flight: self.in_flight,
            successes: self.successes,
            failures: self.failures,
            discarded: self.discarded,
            applied_seq: self.applied_seq,
        }
    }
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            latest_value: None,
            last_error: None,
            in_flight: 0,
            successes: 0,
            failures: 0,
            discarded: 0,
            applied_seq: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Value,
    Error,
    Stale,
}

impl<T> ResourceState<T> {
    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Sequence number of the last applied poll outcome.
    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    pub fn begin(&mut self) {
        self.in_flight += 1;
    }

    /// Folds the outcome of poll `seq` into the state.
    pub fn apply(&mut self, seq: u64, outcome: Result<T, FetchError>) -> Applied {
        self.in_flight = self.in_flight.saturating_sub(1);
        if seq <= self.applied_seq {
            self.discarded += 1;
            return Applied::Stale;
        }
        self.applied_seq = seq;

        match outcome {
            Ok(value) => {
                self.latest_value = Some(Arc::new(value));
                self.last_error = None;
                self.successes += 1;
                Applied::Value
            }
            Err(err) => {
                self.last_error = Some(err);
                self.failures += 1;
                Applied::Error
            }
        }
    }
}

pub struct PollHandle<T> {
    path: String,
    state: watch::Receiver<ResourceState<T>>,
    task: JoinHandle<()>,
}

impl<T: Decode> PollHandle<T> {
    /// Fetches `path` immediately and then every `every`.
    pub fn spawn(fetcher: Arc<dyn Fetch>, path: impl Into<String>, every: Duration) -> Self {
        let path = path.into();
        let (tx, rx) = watch::channel(ResourceState::default());
        let task = tokio::spawn(run_poller::<T>(fetcher, path.clone(), every, tx));
        Self {
            path,
            state: rx,
            task,
        }
    }
}

impl<T> PollHandle<T> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.state.clone()
    }

    pub fn state(&self) -> ResourceState<T> {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        // Drop does the work.
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
        debug!(path = %self.path, "poller stopped");
    }
}

async fn run_poller<T: Decode>(
    fetcher: Arc<dyn Fetch>,
    path: String,
    every: Duration,
    tx: watch::Sender<ResourceState<T>>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // owned here so aborting this task aborts the fetches too
    let mut in_flight: JoinSet<(u64, Result<T, FetchError>)> = JoinSet::new();
    let mut next_seq: u64 = 0;

    info!(
        path = %path,
        every_ms = every.as_millis() as u64,
        "poller started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                next_seq += 1;
                let seq = next_seq;
                tx.send_modify(|s| s.begin());

                let fetcher = Arc::clone(&fetcher);
                let path = path.clone();
                in_flight.spawn(async move {
                    let outcome = fetcher.fetch(&path).await.and_then(T::decode);
                    (seq, outcome)
                });
            }
            Some(joined) = in_flight.join_next() => {
                let (seq, outcome) = match joined {
                    Ok(done) => done,
                    Err(e) => {
                        warn!(path = %path, error = %e, "fetch task failed");
                        tx.send_modify(|s| {
                            s.in_flight = s.in_flight.saturating_sub(1);
                        });
                        continue;
                    }
                };

                if let Err(err) = &outcome {
                    warn!(path = %path, seq, error = %err, "poll failed");
                }
                let mut applied = Applied::Stale;
                tx.send_modify(|s| applied = s.apply(seq, outcome));
                match applied {
                    Applied::Value => debug!(path = %path, seq, "poll applied"),
                    Applied::Stale => warn!(path = %path, seq, "out-of-order response discarded"),
                    Applied::Error => {}
                }
            }
        }
    }
}
