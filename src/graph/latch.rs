//! One-shot gate awaited by lifecycle callers.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A one-shot gate: closed until opened, then open forever.
#[derive(Default)]
pub(crate) struct Latch {
    open: AtomicBool,
    notify: Notify,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&self) {
        self.open.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Resolves once the latch is open.
    pub(crate) async fn wait(&self) {
        loop {
            // Register before checking so an `open` in between is not missed.
            let notified = self.notify.notified();
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }
}
