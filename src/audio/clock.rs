//! Explicit audio clock handles.
//!
//! The playback scheduler and the capture pipeline each receive their own
//! clock handle from the session manager instead of reading a process-wide
//! time source.  Each [`SessionClock`] starts at `0.0` when created, so a
//! fresh session always begins with an unscheduled (`next_playback_time ==
//! 0.0`) timeline.
//!
//! [`ManualClock`] is a test double whose time only moves when the test
//! advances it.

use std::time::Instant;

// ---------------------------------------------------------------------------
// AudioClock
// ---------------------------------------------------------------------------

/// A monotonic clock measured in seconds.
///
/// Implementations must be `Send + Sync` so a clock handle can be shared
/// between the scheduler, its drain watchers, and the session event loop.
pub trait AudioClock: Send + Sync {
    /// Seconds elapsed on this clock's timeline.
    fn now(&self) -> f64;
}

// ---------------------------------------------------------------------------
// SessionClock
// ---------------------------------------------------------------------------

/// Monotonic wall clock starting at `0.0` at construction.
///
/// One is created per session for capture and one for playback — the two
/// timelines are independent and both die with the session.
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    /// Create a clock whose `now()` is `0.0` at this instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SessionClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

// ---------------------------------------------------------------------------
// ManualClock  (test-only)
// ---------------------------------------------------------------------------

/// A clock that only advances when told to — deterministic scheduling tests.
#[cfg(test)]
pub struct ManualClock {
    time: std::sync::Mutex<f64>,
}

#[cfg(test)]
impl ManualClock {
    /// Create a manual clock starting at `0.0`.
    pub fn new() -> Self {
        Self {
            time: std::sync::Mutex::new(0.0),
        }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: f64) {
        *self.time.lock().unwrap() += secs;
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, secs: f64) {
        *self.time.lock().unwrap() = secs;
    }
}

#[cfg(test)]
impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.time.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
