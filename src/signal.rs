//! Change notification for tally observers
//!
//! Observers should not be woken once per vote. `notify()` marks every
//! listener as pending; several notifications before a listener looks
//! collapse into a single wakeup.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ChangeSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Mark all listeners as pending
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Create a listener. Notifications sent before this call are not pending.
    pub fn listen(&self) -> ChangeListener {
        ChangeListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ChangeListener {
    rx: watch::Receiver<u64>,
}

impl ChangeListener {
    /// Wait until a notification is pending, then clear it.
    ///
    /// Returns false once the signal has been dropped.
    pub async fn wait_and_clear(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
