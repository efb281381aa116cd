//! Up/down flash classification for numeric fields that change between polls.
//!
//! Each tracked field keeps its previous sample and the classification derived
//! from the latest comparison. A non-`None` classification is only visible for
//! [`FLASH_DURATION`] after it was set; the deadline is evaluated lazily against
//! the caller's clock, so no timer has to be cancelled when the tracker is dropped.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::config::FLASH_DURATION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Up,
    Down,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct DeltaState {
    pub previous: Option<f64>,
    classification: Classification,
    expires_at: Option<Instant>,
}

impl DeltaState {
    fn new() -> Self {
        Self {
            previous: None,
            classification: Classification::None,
            expires_at: None,
        }
    }

    pub fn classification_at(&self, now: Instant) -> Classification {
        match self.expires_at {
            Some(deadline) if now < deadline => self.classification,
            _ => Classification::None,
        }
    }
}

/// Per-field delta state, owned by a single view.
#[derive(Debug, Clone)]
pub struct DeltaTracker<K> {
    fields: HashMap<K, DeltaState>,
    flash: Duration,
}

impl<K: Eq + Hash> Default for DeltaTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> DeltaTracker<K> {
    pub fn new() -> Self {
        Self::with_flash(FLASH_DURATION)
    }

    pub fn with_flash(flash: Duration) -> Self {
        Self {
            fields: HashMap::new(),
            flash,
        }
    }

    /// Records a new sample for `key` and returns its classification against
    /// the previous sample. A directional change restarts the flash lifetime.
    pub fn observe(&mut self, key: K, value: f64, now: Instant) -> Classification {
        let flash = self.flash;
        let state = self.fields.entry(key).or_insert_with(DeltaState::new);

        let classification = match state.previous {
            None => Classification::None,
            Some(prev) if value > prev => Classification::Up,
            Some(prev) if value < prev => Classification::Down,
            Some(_) => Classification::None,
        };
        state.previous = Some(value);
        state.classification = classification;
        state.expires_at = match classification {
            Classification::None => None,
            _ => Some(now + flash),
        };

        classification
    }

    /// Classification of `key` as seen at `now`; `None` once the flash expired
    /// or if the field was never observed.
    pub fn classification(&self, key: &K, now: Instant) -> Classification {
        self.fields
            .get(key)
            .map(|s| s.classification_at(now))
            .unwrap_or(Classification::None)
    }

    pub fn state(&self, key: &K) -> Option<&DeltaState> {
        self.fields.get(key)
    }
}
