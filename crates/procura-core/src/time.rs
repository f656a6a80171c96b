//! Time handling: timestamps, validity windows, and the injectable clock.
//!
//! All protocol decisions read time through the [`Clock`] trait so tests can
//! drive expiry deterministically. Validity windows are half-open:
//! `[valid_from, valid_until)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A point in time as whole seconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from seconds since the Unix epoch.
    pub const fn from_unix_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Seconds since the Unix epoch.
    pub const fn as_unix_secs(self) -> u64 {
        self.0
    }

    /// This timestamp advanced by `secs` seconds.
    pub const fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// This timestamp moved back by `secs` seconds, saturating at the epoch.
    pub const fn minus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Half-open validity interval `[valid_from, valid_until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// First instant at which the window is in force.
    pub valid_from: Timestamp,
    /// First instant at which the window is no longer in force.
    pub valid_until: Timestamp,
}

impl ValidityWindow {
    /// Create a window; `valid_until` must be strictly after `valid_from`.
    pub const fn new(valid_from: Timestamp, valid_until: Timestamp) -> Self {
        Self {
            valid_from,
            valid_until,
        }
    }

    /// Whether `at` falls within the window.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.valid_from <= at && at < self.valid_until
    }

    /// Whether the window has fully elapsed as of `now`.
    pub fn is_elapsed(&self, now: Timestamp) -> bool {
        self.valid_until <= now
    }

    /// Whether the window is empty or inverted.
    pub fn is_degenerate(&self) -> bool {
        self.valid_until <= self.valid_from
    }
}

/// Source of current time for protocol decisions.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Timestamp::from_unix_secs(secs)
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock starting at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start.as_unix_secs())),
        }
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, at: Timestamp) {
        self.now.store(at.as_unix_secs(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_secs(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_half_open() {
        let window = ValidityWindow::new(Timestamp::from_unix_secs(100), Timestamp::from_unix_secs(200));
        assert!(!window.contains(Timestamp::from_unix_secs(99)));
        assert!(window.contains(Timestamp::from_unix_secs(100)));
        assert!(window.contains(Timestamp::from_unix_secs(199)));
        assert!(!window.contains(Timestamp::from_unix_secs(200)));
    }

    #[test]
    fn elapsed_and_degenerate_windows() {
        let window = ValidityWindow::new(Timestamp::from_unix_secs(100), Timestamp::from_unix_secs(200));
        assert!(!window.is_elapsed(Timestamp::from_unix_secs(150)));
        assert!(window.is_elapsed(Timestamp::from_unix_secs(200)));
        assert!(!window.is_degenerate());

        let inverted = ValidityWindow::new(Timestamp::from_unix_secs(200), Timestamp::from_unix_secs(100));
        assert!(inverted.is_degenerate());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Timestamp::from_unix_secs(1_000));
        assert_eq!(clock.now(), Timestamp::from_unix_secs(1_000));
        clock.advance_secs(3_600);
        assert_eq!(clock.now(), Timestamp::from_unix_secs(4_600));
    }
}
