//! Derived Cell
//!
//! A `Computed` wraps a pure function of other cells. Its lifecycle is
//! driven by its subscriber count:
//!
//! - **Cold** (zero subscribers): nothing is tracked and nothing is
//!   cached. Every read recomputes from scratch. This is the stricter of
//!   the two plausible cold semantics, chosen so a cold cell can never
//!   serve a value that predates its inputs.
//!
//! - **Hot** (one or more subscribers): an internal tracked scope keeps
//!   the cached value current, recomputing whenever an input changes and
//!   publishing only when the result actually differs (`PartialEq`). An
//!   upstream change that leaves the derived value unchanged is absorbed
//!   here and never reaches downstream subscribers.
//!
//! Reading the cell inside a tracked scope subscribes that scope like any
//! other subscriber, so a tracked read of a cold cell is what switches it
//! hot. When the last subscriber releases, the internal scope stops and
//! the cell returns to cold.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::context;
use super::scope::{watch, Scope};
use super::subscribable::{Callback, Observable, Subscribable, Subscription};

/// Create a derived cell from a compute function.
///
/// `compute` must be a pure function of other cells' values; side effects
/// are not detected, just wrong.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let compute: Arc<dyn Fn() -> T + Send + Sync> = Arc::new(compute);

    let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
        let weak = weak.clone();
        let scope = watch(move || {
            // The cell owning this scope may already be gone; a re-run
            // scheduled past that point is a no-op.
            if let Some(inner) = weak.upgrade() {
                inner.refresh();
            }
        });

        ComputedInner {
            subscribable: Subscribable::new(),
            value: RwLock::new(None),
            compute,
            scope,
        }
    });

    Computed { inner }
}

/// A derived reactive cell.
///
/// Cloning shares the cell.
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    subscribable: Subscribable,
    value: RwLock<Option<T>>,
    compute: Arc<dyn Fn() -> T + Send + Sync>,
    scope: Scope,
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Body of the internal scope: recompute, and publish only when the
    /// result differs from the cached value.
    fn refresh(&self) {
        let next = (self.compute)();

        let changed = {
            let mut slot = self.value.write();
            let changed = slot.as_ref() != Some(&next);
            if changed {
                *slot = Some(next);
            }
            changed
        };

        if changed {
            trace!("derived cell changed, publishing");
            self.subscribable.publish();
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        // Releases the subscriptions the internal scope holds on upstream
        // cells.
        self.scope.stop();
    }
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Read the current value.
    ///
    /// A tracked scope reading the cell becomes a subscriber (switching
    /// the cell hot if it was cold) and sees the cached value; an
    /// untracked read of a cold cell recomputes directly.
    pub fn get(&self) -> T {
        if let Some(record) = context::active() {
            record.register_dependency(self);
        }

        self.read_current()
    }

    /// Read the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.read_current()
    }

    fn read_current(&self) -> T {
        if self.inner.subscribable.has_subscribers() {
            self.inner
                .value
                .read()
                .clone()
                .expect("hot derived cell holds a cached value")
        } else {
            (self.inner.compute)()
        }
    }

    /// Check whether the internal scope is currently keeping the cache
    /// fresh.
    pub fn is_hot(&self) -> bool {
        self.inner.subscribable.has_subscribers()
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribable.subscriber_count()
    }

    /// Check whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Observable for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Add a subscriber, starting the internal scope on the first one.
    ///
    /// The returned subscription, once released, stops the internal scope
    /// again when it was the last subscriber.
    fn subscribe(&self, callback: Callback) -> Subscription {
        if !self.inner.subscribable.has_subscribers() {
            debug!("derived cell switching hot");
            // The first run seeds the cache; it publishes to nobody since
            // the callback is added just after. Detached: the scope lives
            // until the last subscriber releases, even if the subscriber
            // that switched the cell hot is itself a scope that later
            // stops.
            self.inner.scope.start_detached();
        }

        let direct = self.inner.subscribable.subscribe(callback);

        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            direct.unsubscribe();
            if !inner.subscribable.has_subscribers() {
                debug!("derived cell switching cold");
                inner.scope.stop();
            }
        })
    }

    fn has_subscribers(&self) -> bool {
        self.inner.subscribable.has_subscribers()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("hot", &self.is_hot())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
