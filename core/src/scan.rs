//! Duplicate-scan suppression for check-in clients.
//!
//! A camera decodes the same code on many successive frames. The debouncer
//! drops a value seen again within the cooldown so each physical scan becomes
//! one check-in request. It is a courtesy to the server only: double
//! redemption is prevented by the atomic `valid → used` transition.

use std::time::{Duration, Instant};

/// Default cooldown between identical scans.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1500);

/// Suppresses repeats of the last scanned value within a cooldown.
#[derive(Debug, Clone)]
pub struct ScanDebouncer {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl ScanDebouncer {
    /// Creates a debouncer with the given cooldown
    #[must_use]
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    /// Whether `value`, scanned at `at`, should be submitted.
    ///
    /// A different value is always admitted. The same value is admitted once
    /// the cooldown since its last admission has passed.
    pub fn admit(&mut self, value: &str, at: Instant) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        if let Some((last, seen_at)) = &self.last {
            if last == value && at.saturating_duration_since(*seen_at) < self.cooldown {
                return false;
            }
        }
        self.last = Some((value.to_string(), at));
        true
    }
}
