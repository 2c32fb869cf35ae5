use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One-shot gate that threads can block on until some other thread opens it.
/// Once set, a latch stays set for the rest of its life.
#[derive(Debug, Default)]
pub struct Latch {
    set: AtomicBool,
    cv: Condvar,
    mu: Mutex<()>,
}

impl Latch {
    /// Create a new, unset `Latch`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch and wake all waiting threads. Idempotent.
    pub fn set(&self) {
        // the store happens-before the wakeup checks below
        self.set.store(true, Ordering::Release);
        let _guard = self.mu.lock().expect("latch lock");
        self.cv.notify_all();
    }

    /// True if the latch has been set.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Block until the latch is set.
    pub fn wait(&self) {
        if self.is_set() {
            return;
        }
        let guard = self.mu.lock().expect("latch lock");
        let _guard = self
            .cv
            .wait_while(guard, |_| !self.is_set())
            .expect("latch wait");
    }

    /// Block until the latch is set or `timeout` elapses.
    /// Returns true if the latch was set in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        let guard = self.mu.lock().expect("latch lock");
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |_| !self.is_set())
            .expect("latch wait");
        drop(guard);
        self.is_set()
    }
}

#[cfg(test)]
mod test {
    use super::Latch;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_set_then_wait_returns_immediately() {
        let latch = Latch::new();
        latch.set();
        latch.wait();
        assert!(latch.is_set());
    }

    #[test]
    fn test_wait_across_threads() {
        let latch = Arc::new(Latch::new());
        let latch2 = Arc::clone(&latch);
        let waiter = std::thread::spawn(move || latch2.wait());
        std::thread::sleep(Duration::from_millis(10));
        latch.set();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let latch = Latch::new();
        assert!(!latch.wait_timeout(Duration::from_millis(10)));
        latch.set();
        assert!(latch.wait_timeout(Duration::from_millis(10)));
    }
}
