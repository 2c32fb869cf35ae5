use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use colored::Colorize;

use crate::job::panic_message;

/// Receives cascade lifecycle events.
///
/// Callbacks are fallible: a listener that returns an error, or panics, never
/// takes the cascade down with it. The fault is logged and the cascade
/// responds by stopping itself, so a broken listener degrades a run to
/// `Stopped` instead of poisoning it.
pub trait CascadeListener: Send + Sync {
    /// The cascade is about to start running flows.
    fn on_starting(&self, cascade: &str) -> Result<()> {
        let _ = cascade;
        Ok(())
    }

    /// The cascade has been asked to stop.
    fn on_stopping(&self, cascade: &str) -> Result<()> {
        let _ = cascade;
        Ok(())
    }

    /// The run is over, whatever the outcome. Always the last event.
    fn on_completed(&self, cascade: &str) -> Result<()> {
        let _ = cascade;
        Ok(())
    }

    /// A flow failed. Return `Ok(true)` to report the failure as handled;
    /// handling is recorded in the log but does not change the run's outcome.
    fn on_throwable(&self, cascade: &str, error: &anyhow::Error) -> Result<bool> {
        let _ = (cascade, error);
        Ok(false)
    }
}

/// The cascade's listener list. Listeners are identified by the `Arc` they
/// were registered with, so the same value registered twice is two listeners.
pub(crate) struct Listeners {
    list: Mutex<Vec<Arc<dyn CascadeListener>>>,
}

impl Listeners {
    pub(crate) fn new(initial: Vec<Arc<dyn CascadeListener>>) -> Self {
        Self {
            list: Mutex::new(initial),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn CascadeListener>) {
        self.list.lock().expect("listener list lock").push(listener);
    }

    /// Remove a previously added listener; true if it was found.
    pub(crate) fn remove(&self, listener: &Arc<dyn CascadeListener>) -> bool {
        let mut list = self.list.lock().expect("listener list lock");
        let before = list.len();
        list.retain(|l| !Arc::ptr_eq(l, listener));
        list.len() < before
    }

    pub(crate) fn fire_starting(&self, cascade: &str) -> bool {
        self.fire(cascade, "on_starting", |l| l.on_starting(cascade))
    }

    pub(crate) fn fire_stopping(&self, cascade: &str) -> bool {
        self.fire(cascade, "on_stopping", |l| l.on_stopping(cascade))
    }

    pub(crate) fn fire_completed(&self, cascade: &str) -> bool {
        self.fire(cascade, "on_completed", |l| l.on_completed(cascade))
    }

    /// Notify listeners of a flow failure. Returns true if any listener
    /// faulted while being notified.
    pub(crate) fn fire_throwable(&self, cascade: &str, error: &anyhow::Error) -> bool {
        let mut fault = false;
        let mut handled = false;
        for listener in self.snapshot() {
            match guard(|| listener.on_throwable(cascade, error)) {
                Ok(h) => handled |= h,
                Err(e) => {
                    log::warn!("cascade \"{cascade}\": listener failed in on_throwable: {e:#}");
                    fault = true;
                }
            }
        }
        if handled {
            log::debug!("cascade \"{cascade}\": a listener handled the failure");
        }
        fault
    }

    /// Dispatch one event to every listener. Returns true if any listener
    /// faulted; the caller decides what to do about it.
    fn fire(
        &self,
        cascade: &str,
        event: &str,
        notify: impl Fn(&Arc<dyn CascadeListener>) -> Result<()>,
    ) -> bool {
        let mut fault = false;
        for listener in self.snapshot() {
            if let Err(e) = guard(|| notify(&listener)) {
                log::warn!("cascade \"{cascade}\": listener failed in {event}: {e:#}");
                fault = true;
            }
        }
        fault
    }

    // snapshot the list so callbacks can add or remove listeners:
    fn snapshot(&self) -> Vec<Arc<dyn CascadeListener>> {
        self.list.lock().expect("listener list lock").clone()
    }
}

// a panicking listener is handled the same as one that returned an error
fn guard<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(anyhow!("listener panicked: {}", panic_message(payload))))
}

/// Prints a colored status line for each cascade lifecycle event.
pub struct ConsoleListener;

impl CascadeListener for ConsoleListener {
    fn on_starting(&self, cascade: &str) -> Result<()> {
        eprintln!("{} {cascade}", "STARTING".magenta());
        Ok(())
    }

    fn on_stopping(&self, cascade: &str) -> Result<()> {
        eprintln!("{} {cascade}", "STOPPING".yellow());
        Ok(())
    }

    fn on_completed(&self, cascade: &str) -> Result<()> {
        eprintln!("{} {cascade}", "COMPLETED".green());
        Ok(())
    }

    fn on_throwable(&self, cascade: &str, error: &anyhow::Error) -> Result<bool> {
        eprintln!("{} {cascade}: {error:#}", "FAILED".red());
        Ok(false)
    }
}

#[cfg(test)]
mod test {
    use super::{CascadeListener, Listeners};
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
    }

    impl CascadeListener for Counting {
        fn on_starting(&self, _cascade: &str) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Faulty;

    impl CascadeListener for Faulty {
        fn on_starting(&self, _cascade: &str) -> Result<()> {
            Err(anyhow!("listener broke"))
        }
    }

    struct Panicking;

    impl CascadeListener for Panicking {
        fn on_starting(&self, _cascade: &str) -> Result<()> {
            panic!("listener blew up");
        }
    }

    #[test]
    fn test_remove_uses_identity() {
        let listeners = Listeners::new(Vec::new());
        let a: Arc<dyn CascadeListener> = Arc::new(Counting::default());
        let b: Arc<dyn CascadeListener> = Arc::new(Counting::default());
        listeners.add(Arc::clone(&a));

        assert!(!listeners.remove(&b), "different instance is not removed");
        assert!(listeners.remove(&a));
        assert!(!listeners.remove(&a), "second removal finds nothing");
    }

    #[test]
    fn test_fault_is_isolated_and_reported() {
        let counting = Arc::new(Counting::default());
        let listeners = Listeners::new(vec![Arc::new(Faulty), counting.clone()]);

        let fault = listeners.fire_starting("c");
        assert!(fault);
        // the faulty listener did not keep the second one from being notified:
        assert_eq!(counting.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_a_fault() {
        let counting = Arc::new(Counting::default());
        let listeners = Listeners::new(vec![Arc::new(Panicking), counting.clone()]);

        assert!(listeners.fire_starting("c"), "the panic reads as a fault");
        assert_eq!(counting.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_fault_when_all_succeed() {
        let listeners = Listeners::new(vec![Arc::new(Counting::default())]);
        assert!(!listeners.fire_starting("c"));
        assert!(!listeners.fire_completed("c"));
    }
}
