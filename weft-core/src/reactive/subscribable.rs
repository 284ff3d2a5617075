//! Subscribable Primitive
//!
//! A `Subscribable` is the publish/subscribe building block under every
//! cell and tracked scope: a set of interested callbacks, each held at most
//! once, that a publish hands to the frame scheduler.
//!
//! Publishing never invokes a callback synchronously. The only exception is
//! the crate-internal `publish_sync`, which the scope lifecycle uses to
//! tear down nested scopes before a parent re-runs.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::scheduler;

/// A deferred unit of reactive work.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Identity of a callback: the address of its `Arc` allocation. Two clones
/// of the same `Arc` share one identity, which is what makes subscriber
/// sets and the scheduler batch deduplicate.
pub(crate) fn callback_id(callback: &Callback) -> usize {
    Arc::as_ptr(callback) as *const () as usize
}

type SubscriberMap = RwLock<IndexMap<usize, Callback>>;

/// Types that can hand out change subscriptions.
///
/// Implemented by [`Subscribable`] itself and by the reactive cells. The
/// derived cell's implementation is not a plain delegation: its first
/// subscriber switches the cell hot, so dependency registration has to go
/// through this trait rather than through the raw subscriber set.
pub trait Observable {
    /// Register a callback to run (via the scheduler) after each publish.
    fn subscribe(&self, callback: Callback) -> Subscription;

    /// Check whether any callback is currently registered.
    fn has_subscribers(&self) -> bool;
}

/// A set of callbacks interested in a change notification.
///
/// Cloning shares the underlying subscriber set.
pub struct Subscribable {
    subscribers: Arc<SubscriberMap>,
}

impl Subscribable {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Number of currently registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Schedule every registered callback for the next frame.
    ///
    /// A publish with zero subscribers is a cheap no-op.
    pub fn publish(&self) {
        // Snapshot first: a frame driver may run arbitrary code from
        // inside `enqueue`, and it must not find the subscriber set
        // locked.
        let snapshot: Vec<Callback> = {
            let subscribers = self.subscribers.read();
            if subscribers.is_empty() {
                return;
            }
            subscribers.values().cloned().collect()
        };

        for callback in snapshot {
            scheduler::enqueue(callback);
        }
    }

    /// Invoke every registered callback immediately.
    ///
    /// Used only for scope re-run notifications, where nested scopes must
    /// be torn down before the publisher's new body runs. The subscriber
    /// set is snapshotted first, so callbacks may unsubscribe themselves
    /// mid-notification.
    pub(crate) fn publish_sync(&self) {
        let snapshot: Vec<Callback> = self.subscribers.read().values().cloned().collect();

        for callback in snapshot {
            callback();
        }
    }
}

impl Observable for Subscribable {
    fn subscribe(&self, callback: Callback) -> Subscription {
        let id = callback_id(&callback);
        self.subscribers.write().insert(id, callback);

        Subscription::direct(Arc::downgrade(&self.subscribers), id)
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty()
    }
}

impl Default for Subscribable {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Subscribable {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

/// Handle that removes exactly one callback from exactly one subscriber
/// set.
///
/// Releasing is idempotent: the removal runs once, whether triggered by an
/// explicit [`unsubscribe`](Subscription::unsubscribe) or by dropping the
/// handle. Removing an entry that is already gone (or whose publisher has
/// been dropped) is a no-op.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    fn direct(subscribers: Weak<SubscriberMap>, id: usize) -> Self {
        Self::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.write().shift_remove(&id);
            }
        })
    }

    /// Remove the callback from its publisher.
    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
