use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use syncd_domain::{Clock, ExternalId, SystemClock};

/// Shared between the push channel and the reconciler (§4.5, §4.6): the push
/// channel touches an id whenever it applies an event for it; the reconciler
/// skips ids touched recently, since the push path owns the truth for the
/// moment right after a live event.
#[derive(Clone)]
pub struct CooldownMap {
    inner: Arc<Mutex<HashMap<ExternalId, Instant>>>,
    clock: Arc<dyn Clock>,
}

impl Default for CooldownMap {
    fn default() -> Self {
        CooldownMap::new()
    }
}

impl CooldownMap {
    pub fn new() -> Self {
        CooldownMap::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        CooldownMap { inner: Arc::new(Mutex::new(HashMap::new())), clock }
    }

    pub fn touch(&self, id: &ExternalId) {
        self.inner.lock().expect("cooldown map lock").insert(id.clone(), self.clock.instant());
    }

    /// True when `id` was touched within `window` of now.
    pub fn is_hot(&self, id: &ExternalId, window: Duration) -> bool {
        let now = self.clock.instant();
        self.inner
            .lock()
            .expect("cooldown map lock")
            .get(id)
            .is_some_and(|t| now.saturating_duration_since(*t) < window)
    }

    pub fn prune(&self, window: Duration) {
        let now = self.clock.instant();
        self.inner
            .lock()
            .expect("cooldown map lock")
            .retain(|_, t| now.saturating_duration_since(*t) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncd_domain::FakeClock;

    #[test]
    fn touched_id_is_hot_until_window_elapses() {
        let map = CooldownMap::new();
        let id = ExternalId::new("ext-1");
        assert!(!map.is_hot(&id, Duration::from_secs(45)));
        map.touch(&id);
        assert!(map.is_hot(&id, Duration::from_secs(45)));
    }

    #[test]
    fn prune_removes_stale_entries() {
        let map = CooldownMap::new();
        let id = ExternalId::new("ext-1");
        map.touch(&id);
        map.prune(Duration::from_millis(0));
        assert!(!map.is_hot(&id, Duration::from_secs(45)));
    }

    #[test]
    fn fake_clock_drives_cooldown_expiry_deterministically() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let map = CooldownMap::with_clock(clock.clone());
        let id = ExternalId::new("ext-1");
        map.touch(&id);
        assert!(map.is_hot(&id, Duration::from_secs(45)));
        clock.advance(Duration::from_secs(46));
        assert!(!map.is_hot(&id, Duration::from_secs(45)));
    }
}
