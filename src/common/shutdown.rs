//! Graceful-shutdown coordination.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// One-shot shutdown signal shared between the engine and its worker loops.
///
/// `wait` resolves once `shutdown` has been called, no matter how many
/// waiters there are or when they subscribed.
pub struct Shutdown {
    notify: Notify,
    terminated: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            terminated: AtomicBool::new(false),
        }
    }

    /// Signal all waiters and mark the coordinator terminated.
    pub fn shutdown(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Future that resolves when `shutdown` is called.
    pub fn wait(self: &Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let this = self.clone();
        async move {
            loop {
                // Register before checking the flag so a signal arriving
                // in between is not lost.
                let notified = this.notify.notified();
                if this.terminated.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
