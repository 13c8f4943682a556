//! Dirty tracking and session timing.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::elapsed_between;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Process-lifetime timing state. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTimer {
    session_start: DateTime<Utc>,
    played_at_load: Duration,
    dirty: bool,
    since_autosave: Duration,
    interval: Duration,
    authenticated: bool,
}

impl SessionTimer {
    pub fn new(now: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            session_start: now,
            played_at_load: Duration::ZERO,
            dirty: false,
            since_autosave: Duration::ZERO,
            interval,
            authenticated: false,
        }
    }

    pub fn on_field_changed(&mut self) {
        self.dirty = true;
    }

    /// Advances the autosave timer. Runs whether or not the session is
    /// signed in.
    pub fn tick(&mut self, delta: Duration) {
        self.since_autosave = self.since_autosave.saturating_add(delta);
    }

    pub fn should_autosave(&self) -> bool {
        self.authenticated && self.dirty && self.since_autosave >= self.interval
    }

    /// Called after any successful commit, automatic or manual.
    pub fn on_save_completed(&mut self) {
        self.dirty = false;
        self.since_autosave = Duration::ZERO;
    }

    /// Restarts the session clock from a freshly loaded slot.
    pub fn on_load_completed(&mut self, now: DateTime<Utc>, stored_total: Duration) {
        self.session_start = now;
        self.played_at_load = stored_total;
    }

    /// Record now matches what is stored.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Total played time to write into a slot at `now`.
    pub fn played_time_at(&self, now: DateTime<Utc>) -> Duration {
        self.played_at_load
            .saturating_add(elapsed_between(self.session_start, now))
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn since_autosave(&self) -> Duration {
        self.since_autosave
    }

    pub fn played_at_load(&self) -> Duration {
        self.played_at_load
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
