use config::shared::BufferConfig;
use tracing::debug;

/// High/low watermark guard deciding whether a producer may add more records to its cache.
///
/// Production is allowed while the cache is below `top_limit`. Once the cache has reached
/// `top_limit` during the current production cycle, production stays blocked until the cache has
/// drained down to `bottom_limit`, so that a cache hovering right under its ceiling does not
/// toggle between producing and waiting on every record.
#[derive(Debug, Clone)]
pub struct HysteresisTracker {
    top_limit: usize,
    bottom_limit: usize,
    previously_saturated: bool,
}

impl HysteresisTracker {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            top_limit: config.top_limit,
            bottom_limit: config.bottom_limit,
            previously_saturated: false,
        }
    }

    /// Clears the saturation flag. Called once at the start of every production cycle.
    pub fn reset(&mut self) {
        self.previously_saturated = false;
    }

    /// Records the cache size right after records were added to it.
    pub fn observe(&mut self, count: usize) {
        if count >= self.top_limit {
            self.previously_saturated = true;
        }
    }

    pub fn is_saturated(&self) -> bool {
        self.previously_saturated
    }

    /// Returns whether the producer may pull another batch with `count` records cached.
    pub fn may_produce(&self, count: usize, paused: bool) -> bool {
        let may_produce = !paused
            && count < self.top_limit
            && !(self.previously_saturated && count > self.bottom_limit);

        debug!(
            count,
            paused,
            previously_saturated = self.previously_saturated,
            top_limit = self.top_limit,
            bottom_limit = self.bottom_limit,
            may_produce,
            "evaluated buffered producer watermarks"
        );

        may_produce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HysteresisTracker {
        HysteresisTracker::new(BufferConfig {
            top_limit: 10,
            bottom_limit: 4,
        })
    }

    #[test]
    fn produces_below_top_limit_when_not_saturated() {
        let tracker = tracker();

        assert!(tracker.may_produce(0, false));
        assert!(tracker.may_produce(9, false));
        assert!(!tracker.may_produce(10, false));
        assert!(!tracker.may_produce(11, false));
    }

    #[test]
    fn waits_for_bottom_limit_after_saturation() {
        let mut tracker = tracker();
        tracker.observe(10);

        assert!(tracker.is_saturated());
        assert!(!tracker.may_produce(9, false));
        assert!(!tracker.may_produce(5, false));
        assert!(tracker.may_produce(4, false));
        assert!(tracker.may_produce(0, false));
    }

    #[test]
    fn reset_clears_saturation() {
        let mut tracker = tracker();
        tracker.observe(12);
        tracker.reset();

        assert!(!tracker.is_saturated());
        assert!(tracker.may_produce(9, false));
    }

    #[test]
    fn observing_below_top_limit_does_not_saturate() {
        let mut tracker = tracker();
        tracker.observe(9);

        assert!(tracker.may_produce(9, false));
    }

    #[test]
    fn pause_blocks_production() {
        let tracker = tracker();

        assert!(!tracker.may_produce(0, true));
    }
}
