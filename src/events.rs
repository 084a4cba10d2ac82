/*!
 * Event Plumbing
 * Broadcast emitters and disposable subscriptions
 */

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Default buffer: 1024 events
const DEFAULT_CAPACITY: usize = 1024;

/// Multi-producer, multi-consumer event emitter.
///
/// Backed by a tokio broadcast channel; subscribers that fall behind see
/// `Lagged` and continue from the oldest retained event.
#[derive(Debug)]
pub struct EventBroadcaster<T: Clone> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> EventBroadcaster<T> {
    /// Create a broadcaster with the given buffer capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Emit to all subscribers; a subscriber-free channel is fine
    pub fn emit(&self, event: T) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBroadcaster<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T: Clone> Clone for EventBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

/// A handle that runs its cleanup action exactly once.
///
/// Dropping the handle disposes it; calling [`Disposable::dispose`] early is
/// idempotent. Cleanup actions must be prepared to run from any thread.
pub struct Disposable {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Disposable {
    #[must_use]
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// A disposable with no cleanup
    #[must_use]
    pub fn empty() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// Run the cleanup now; later calls and the drop are no-ops
    pub fn dispose(&self) {
        if let Some(action) = self.action.lock().take() {
            action();
        }
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable").finish_non_exhaustive()
    }
}
