use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Short-horizon memory of event fingerprints.
///
/// A suppressed duplicate does not refresh the stored timestamp, so a steady
/// stream of identical events collapses into one display line per window.
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    seen: HashMap<String, Instant>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn should_suppress(&mut self, fingerprint: &str, now: Instant) -> bool {
        if let Some(first_seen) = self.seen.get(fingerprint) {
            if now.saturating_duration_since(*first_seen) < self.window {
                debug!(fingerprint, "Suppressing duplicate event");
                return true;
            }
        }

        let window = self.window;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < window);
        self.seen.insert(fingerprint.to_string(), now);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_within_window_suppressed() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(!cache.should_suppress("fp", t0));
        assert!(cache.should_suppress("fp", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_duplicate_after_window_accepted() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(!cache.should_suppress("fp", t0));
        assert!(cache.should_suppress("fp", t0 + Duration::from_secs(5)));
        assert!(!cache.should_suppress("fp", t0 + Duration::from_secs(31)));
    }

    #[test]
    fn test_suppression_does_not_extend_window() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(!cache.should_suppress("fp", t0));
        for secs in [10, 20, 29] {
            assert!(cache.should_suppress("fp", t0 + Duration::from_secs(secs)));
        }
        // Measured from first acceptance, not the last duplicate.
        assert!(!cache.should_suppress("fp", t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_stale_entries_evicted_on_insert() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        cache.should_suppress("a", t0);
        cache.should_suppress("b", t0 + Duration::from_secs(1));
        assert_eq!(cache.len(), 2);
        cache.should_suppress("c", t0 + Duration::from_secs(40));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_fingerprints_independent() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(!cache.should_suppress("a", t0));
        assert!(!cache.should_suppress("b", t0));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.should_suppress("a", t0));
    }
}
