//! Duplicate-detection gate.
//!
//! A single last-key/last-time cell: the same key seen again within the
//! cooldown is suppressed, anything else is admitted and becomes the new
//! last key.

use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct DebounceGate {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl DebounceGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True when `key` repeats the last admitted key inside the cooldown.
    pub fn is_suppressed(&self, key: &str, now: Instant) -> bool {
        match &self.last {
            Some((last_key, seen_at)) => {
                last_key == key && now.saturating_duration_since(*seen_at) <= self.cooldown
            }
            None => false,
        }
    }

    /// Admit `key` unless suppressed. Admission overwrites the cell.
    pub fn admit(&mut self, key: &str, now: Instant) -> bool {
        if self.is_suppressed(key, now) {
            return false;
        }
        self.last = Some((key.to_string(), now));
        true
    }

    pub fn last_key(&self) -> Option<&str> {
        self.last.as_ref().map(|(key, _)| key.as_str())
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
