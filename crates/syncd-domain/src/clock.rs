use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Seam for every wall-clock read in the daemon (§9): reconciler ticks,
/// cooldown windows, token expiry, retention cutoffs. Production code takes
/// `Arc<dyn Clock>` and gets [`SystemClock`]; tests take [`FakeClock`] and
/// control time by calling [`FakeClock::advance`] instead of sleeping.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current monotonic instant, for duration-based windows (cooldowns,
    /// backoff) that must not jump when the system clock is adjusted.
    fn instant(&self) -> Instant;
}

/// The real clock: `Utc::now()` / `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

struct FakeClockState {
    now: DateTime<Utc>,
    // Instant has no stable way to construct an arbitrary value, so the fake
    // instant is anchored at construction and advanced by the same amount as
    // `now` on every `advance()` call.
    anchor: Instant,
    offset: Duration,
}

/// A clock under test control. Starts at a fixed `DateTime<Utc>`; advances
/// only when told to, never on its own.
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        FakeClock {
            state: Arc::new(Mutex::new(FakeClockState {
                now: start,
                anchor: Instant::now(),
                offset: Duration::ZERO,
            })),
        }
    }

    /// Moves both the wall-clock and monotonic readings forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut guard = self.state.lock().expect("fake clock lock");
        guard.now += delta;
        guard.offset += delta;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.state.lock().expect("fake clock lock").now = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().expect("fake clock lock").now
    }

    fn instant(&self) -> Instant {
        let guard = self.state.lock().expect("fake clock lock");
        guard.anchor + guard.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_only_moves_when_advanced() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FakeClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(60));
    }

    #[test]
    fn fake_clock_instant_tracks_the_same_offset() {
        let clock = FakeClock::new(Utc::now());
        let t0 = clock.instant();
        clock.advance(Duration::from_millis(500));
        assert!(clock.instant() >= t0 + Duration::from_millis(500));
    }
}
