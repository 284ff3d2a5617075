//! Writable Cell
//!
//! A `State` is the fundamental reactive primitive: a single mutable value
//! that tracks which scopes read it.
//!
//! Reading inside a tracked scope registers that scope as a dependent.
//! Writing publishes to all dependents through the frame scheduler, unless
//! the new value compares equal to the current one, in which case nothing
//! happens at all.
//!
//! Equality is `PartialEq`. That is a deliberate simplicity choice carried
//! over from the change-detection design: values reachable through shared
//! interior mutability that mutate in place will compare equal and will
//! *not* republish. Mutation-in-place is unsupported; go through `set` or
//! `update`.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::context;
use super::subscribable::{Callback, Observable, Subscribable, Subscription};

/// Create a writable cell holding `initial`.
pub fn state<T>(initial: T) -> State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    State {
        inner: Arc::new(StateInner {
            subscribable: Subscribable::new(),
            value: RwLock::new(initial),
        }),
    }
}

/// A writable reactive cell.
///
/// Cloning shares the cell: all clones read and write the same value and
/// the same subscriber set.
pub struct State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<StateInner<T>>,
}

struct StateInner<T> {
    subscribable: Subscribable,
    value: RwLock<T>,
}

impl<T> State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Read the current value.
    ///
    /// If a tracked scope is running, it becomes a dependent of this cell.
    pub fn get(&self) -> T {
        if let Some(record) = context::active() {
            record.register_dependency(self);
        }

        self.inner.value.read().clone()
    }

    /// Read the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Store a new value and publish to dependents.
    ///
    /// A value equal to the current one is a complete no-op: no store, no
    /// publish, no re-runs.
    pub fn set(&self, value: T) {
        {
            let current = self.inner.value.read();
            if *current == value {
                return;
            }
        }

        *self.inner.value.write() = value;
        trace!("writable cell changed, publishing");
        self.inner.subscribable.publish();
    }

    /// Update the value through a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.inner.value.read();
            f(&current)
        };
        self.set(next);
    }

    /// Number of scopes and explicit subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribable.subscriber_count()
    }

    /// Check whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Observable for State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn subscribe(&self, callback: Callback) -> Subscription {
        self.inner.subscribable.subscribe(callback)
    }

    fn has_subscribers(&self) -> bool {
        self.inner.subscribable.has_subscribers()
    }
}

impl<T> Clone for State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for State<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
