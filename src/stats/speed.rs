//! Event throughput over a sliding window

/// Width of the sliding window in seconds
pub const SPEED_WINDOW_SECS: usize = 30;

/// Rolling count of processed events
///
/// Events are counted in one-second buckets; the speed is the average over
/// the last [`SPEED_WINDOW_SECS`] seconds.
#[derive(Debug, Clone)]
pub struct ProcessingSpeed {
    buckets: [u64; SPEED_WINDOW_SECS],
    /// Second of the most recent bucket (epoch seconds)
    last_tick: i64,
    /// Time of the last event (epoch seconds, 0 if none)
    last_event_at: i64,
}

impl ProcessingSpeed {
    pub fn new() -> Self {
        Self {
            buckets: [0; SPEED_WINDOW_SECS],
            last_tick: 0,
            last_event_at: 0,
        }
    }

    /// Count `events` processed now
    pub fn tick(&mut self, events: u64) {
        self.tick_at(chrono::Utc::now().timestamp(), events);
    }

    /// Count `events` processed at `now` (epoch seconds)
    pub fn tick_at(&mut self, now: i64, events: u64) {
        self.advance(now);
        self.buckets[bucket(now)] += events;
        self.last_event_at = now;
    }

    /// Events per second over the window ending now
    pub fn speed(&self) -> f64 {
        self.speed_at(chrono::Utc::now().timestamp())
    }

    /// Events per second over the window ending at `now`
    pub fn speed_at(&self, now: i64) -> f64 {
        let window = SPEED_WINDOW_SECS as i64;
        if now - self.last_tick >= window {
            return 0.0;
        }
        // Buckets hold (last_tick - window, last_tick]; only the part still
        // inside (now - window, now] counts
        let from = (now - window + 1).max(self.last_tick - window + 1);
        let total: u64 = (from..=self.last_tick).map(|s| self.buckets[bucket(s)]).sum();
        total as f64 / window as f64
    }

    /// Epoch seconds of the last processed event, 0 if none
    pub fn last_event_at(&self) -> i64 {
        self.last_event_at
    }

    fn advance(&mut self, now: i64) {
        if now <= self.last_tick {
            return;
        }
        if now - self.last_tick >= SPEED_WINDOW_SECS as i64 {
            self.buckets = [0; SPEED_WINDOW_SECS];
        } else {
            for s in self.last_tick + 1..=now {
                self.buckets[bucket(s)] = 0;
            }
        }
        self.last_tick = now;
    }
}

impl Default for ProcessingSpeed {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket(second: i64) -> usize {
    second.rem_euclid(SPEED_WINDOW_SECS as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_idle() {
        let speed = ProcessingSpeed::new();
        assert_eq!(speed.speed_at(1_700_000_000), 0.0);
        assert_eq!(speed.last_event_at(), 0);
    }

    #[test]
    fn test_average_over_window() {
        let mut speed = ProcessingSpeed::new();
        let start = 1_700_000_000;

        // 3 events per second for 10 seconds
        for s in 0..10 {
            speed.tick_at(start + s, 3);
        }

        // 30 events over a 30 second window
        assert!((speed.speed_at(start + 9) - 1.0).abs() < f64::EPSILON);
        assert_eq!(speed.last_event_at(), start + 9);
    }

    #[test]
    fn test_old_events_leave_the_window() {
        let mut speed = ProcessingSpeed::new();
        let start = 1_700_000_000;

        speed.tick_at(start, 60);
        assert!((speed.speed_at(start) - 2.0).abs() < f64::EPSILON);

        // Still inside the window 29 seconds later
        assert!((speed.speed_at(start + 29) - 2.0).abs() < f64::EPSILON);
        // Gone after 30 seconds
        assert_eq!(speed.speed_at(start + 30), 0.0);

        // New ticks after a long pause do not see stale buckets
        speed.tick_at(start + 100, 30);
        assert!((speed.speed_at(start + 100) - 1.0).abs() < f64::EPSILON);
    }
}
