//! Activity signal: whether the agent is currently producing a reply.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A cloneable busy/idle flag for the input surface.
///
/// All clones share the same state.
#[derive(Clone, Debug)]
pub struct ActivitySignal {
    busy: Arc<watch::Sender<bool>>,
}

impl Default for ActivitySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySignal {
    pub fn new() -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            busy: Arc::new(busy),
        }
    }

    /// Whether a reply is in progress.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Atomically go from idle to busy. Returns `false` if already busy.
    pub fn try_begin(&self) -> bool {
        self.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        })
    }

    /// Mark busy regardless of the current state.
    pub fn set_busy(&self) {
        self.busy.send_if_modified(|busy| !std::mem::replace(busy, true));
    }

    /// Mark idle.
    pub fn clear(&self) {
        let was_busy = self.busy.send_if_modified(|busy| std::mem::replace(busy, false));
        if was_busy {
            tracing::debug!("Activity signal cleared");
        }
    }

    /// Watch busy/idle transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Wait until no reply is in progress.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.busy.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Wait until idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: Duration) -> bool {
        if !self.is_busy() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }
}
