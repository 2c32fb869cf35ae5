use std::time::{Duration, Instant};

/// Utility for keeping track of the time it took to perform some operation.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new `Timer` starting now.
    pub fn now() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Reset internal timer to now.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Time elapsed since the timer was last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Log a debug line with the elapsed time since the timer was last reset.
    pub fn log_elapsed(&self, what: &str) {
        log::debug!("{} took {:?}", what, self.start.elapsed());
    }
}

#[cfg(test)]
mod test {
    use super::Timer;

    #[test]
    fn test_elapsed_is_monotonic() {
        let timer = Timer::now();
        let first = timer.elapsed();
        let second = timer.elapsed();
        assert!(second >= first);
    }
}
