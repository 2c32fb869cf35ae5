//! Stops running cascades when the process is asked to exit.
//!
//! The handler only stops cascades; deciding whether and when the process
//! itself exits stays with the embedding application.

use std::sync::{Arc, Mutex, Once, OnceLock, Weak};

use crate::cascade::CascadeCore;

static REGISTRY: OnceLock<Mutex<Vec<Weak<CascadeCore>>>> = OnceLock::new();
static HANDLER: Once = Once::new();

fn registry() -> &'static Mutex<Vec<Weak<CascadeCore>>> {
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Stop `cascade` if the process receives Ctrl-C while it is registered.
pub(crate) fn register(cascade: Weak<CascadeCore>) {
    install_handler();
    let mut list = registry().lock().expect("exit registry lock");
    list.retain(|w| w.strong_count() > 0);
    list.push(cascade);
}

pub(crate) fn deregister(cascade: &Arc<CascadeCore>) {
    let target = Arc::downgrade(cascade);
    registry()
        .lock()
        .expect("exit registry lock")
        .retain(|w| !Weak::ptr_eq(w, &target));
}

fn install_handler() {
    HANDLER.call_once(|| {
        let result = ctrlc::set_handler(|| {
            log::info!("exit requested, stopping running cascades");
            let list = registry().lock().expect("exit registry lock").clone();
            for weak in list {
                if let Some(core) = weak.upgrade() {
                    core.stop();
                }
            }
        });
        if let Err(e) = result {
            // another handler is already installed; leave it in charge
            log::warn!("could not install exit handler: {e}");
        }
    });
}
