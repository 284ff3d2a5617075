//! Tracked Scope
//!
//! A tracked scope wraps an arbitrary action and re-runs it whenever a cell
//! it read during its last run changes. Dependency bookkeeping is entirely
//! automatic:
//!
//! 1. Each run pushes the scope onto the tracking context stack, so every
//!    cell read during the run subscribes the scope's re-run callback to
//!    that cell.
//!
//! 2. Before the action body executes, all subscriptions from the previous
//!    run are dropped. A conditional read pattern ("read `a`; if `a` then
//!    read `b` else read `c`") therefore never keeps a subscription to the
//!    branch not taken, which prevents both missed updates and spurious
//!    re-runs.
//!
//! 3. A scope created inside another scope's body subscribes its own
//!    `stop` to the parent's re-run publisher. When the parent re-runs (or
//!    stops), the child is torn down synchronously *before* the parent's
//!    new body executes, and teardown recurses down the whole subtree.
//!
//! Re-runs arrive through the frame scheduler, so however many
//! dependencies changed within one tick, the scope runs at most once in
//! the following flush.

use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::trace;

use super::context::{self, ScopeRecord};
use super::subscribable::{Callback, Observable, Subscribable, Subscription};

/// Create a tracked scope around `action`.
///
/// The action does not run until [`Scope::start`] is called. If `watch` is
/// invoked inside a running scope's body, the new scope becomes a child of
/// that scope once started, and dies when the parent re-runs or stops.
pub fn watch<F>(action: F) -> Scope
where
    F: Fn() + Send + Sync + 'static,
{
    Scope {
        core: Arc::new(ScopeCore {
            action: Box::new(action),
            rerun_publisher: Subscribable::new(),
            state: RwLock::new(ScopeState::default()),
        }),
    }
}

/// Handle to a tracked scope.
///
/// Cloning shares the scope. Dropping the handle does *not* stop the
/// scope: a started scope is kept alive by the subscriptions the cells it
/// reads hold on it, so `watch(..).start()` fire-and-forget patterns work.
/// Call [`stop`](Scope::stop) to release it.
#[derive(Clone)]
pub struct Scope {
    core: Arc<ScopeCore>,
}

impl Scope {
    /// Perform the scope's first run, linking to the enclosing scope (if
    /// any) beforehand.
    ///
    /// A stopped scope may be started again; the derived cell does exactly
    /// that as it cycles between cold and hot.
    pub fn start(&self) {
        if let Some(parent) = context::active() {
            let stop: Callback = {
                let core = Arc::clone(&self.core);
                Arc::new(move || core.stop())
            };
            let linkage = parent.scope().rerun_publisher.subscribe(stop);
            // Replacing an old linkage unsubscribes it; the drop happens
            // outside the state lock.
            let previous = self.core.state.write().parent.replace(linkage);
            drop(previous);
        }

        ScopeCore::run(&self.core);
    }

    /// Perform the scope's first run without linking to any enclosing
    /// scope.
    ///
    /// The derived cell's internal scope starts this way: its lifetime is
    /// governed by the cell's subscriber count, not by whichever scope
    /// happened to trigger the first subscription.
    pub(crate) fn start_detached(&self) {
        ScopeCore::run(&self.core);
    }

    /// Tear the scope down: notify descendants, drop all dependency
    /// subscriptions and the parent linkage. Idempotent.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub(crate) fn core(&self) -> &Arc<ScopeCore> {
        &self.core
    }
}

#[derive(Default)]
struct ScopeState {
    /// Subscriptions to the cells read during the most recent run.
    dependencies: SmallVec<[Subscription; 4]>,

    /// Subscription of this scope's `stop` to the parent's re-run
    /// publisher. Absent for top-level scopes.
    parent: Option<Subscription>,

    /// Bumped on every `stop`. A re-run callback carries the generation it
    /// was created under and goes inert once the generation moves on, so a
    /// callback already sitting in the scheduler when its scope stops is a
    /// safe no-op.
    generation: u64,
}

pub(crate) struct ScopeCore {
    action: Box<dyn Fn() + Send + Sync>,

    /// Publishes (synchronously) right before each re-run and on stop;
    /// direct children subscribe their `stop` here.
    rerun_publisher: Subscribable,

    state: RwLock<ScopeState>,
}

impl ScopeCore {
    /// One run: tear down children, drop stale dependencies, then execute
    /// the action under a fresh tracking record.
    pub(crate) fn run(core: &Arc<ScopeCore>) {
        // Children die before the new body executes, so at most one child
        // instance per `watch` site is ever alive.
        core.rerun_publisher.publish_sync();

        core.clear_dependencies();

        let generation = core.state.read().generation;
        trace!(generation, "running tracked scope");

        let rerun: Callback = {
            let core = Arc::clone(core);
            Arc::new(move || ScopeCore::rerun(&core, generation))
        };

        let _guard = context::enter(ScopeRecord::new(Arc::clone(core), rerun));
        (core.action)();
    }

    /// Scheduled re-entry point. Inert if the scope stopped after this
    /// callback was created.
    fn rerun(core: &Arc<ScopeCore>, generation: u64) {
        if core.state.read().generation != generation {
            trace!(generation, "dropping stale scope re-run");
            return;
        }

        ScopeCore::run(core);
    }

    fn stop(&self) {
        // Descendants first, bottom-up through their own stops.
        self.rerun_publisher.publish_sync();

        let (parent, dependencies) = {
            let mut state = self.state.write();
            state.generation += 1;
            (state.parent.take(), std::mem::take(&mut state.dependencies))
        };

        trace!("stopped tracked scope");
        // Dropping the subscriptions outside the lock unsubscribes them.
        drop(parent);
        drop(dependencies);
    }

    pub(crate) fn hold_dependency(&self, subscription: Subscription) {
        self.state.write().dependencies.push(subscription);
    }

    fn clear_dependencies(&self) {
        let stale = std::mem::take(&mut self.state.write().dependencies);
        drop(stale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::scheduler;
    use crate::reactive::state::state;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn settle() {
        let mut frames = 0;
        while scheduler::has_pending() {
            scheduler::flush();
            frames += 1;
            assert!(frames < 64, "reactive loop did not settle");
        }
    }

    #[test]
    fn start_runs_the_action_once() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let scope = watch(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        scope.start();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scope_reruns_when_a_read_cell_changes() {
        let cell = state(1);
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        let scope = watch(move || {
            cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        scope.start();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cell.set(2);
        settle();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stopped_scope_never_reruns() {
        let cell = state(1);
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        let scope = watch(move || {
            cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        scope.start();

        scope.stop();
        scope.stop();

        cell.set(2);
        settle();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_defeats_an_already_enqueued_rerun() {
        let cell = state(1);
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        let scope = watch(move || {
            cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        scope.start();

        // The re-run is already sitting in the scheduler when the scope
        // stops; it must go inert rather than resurrect the scope.
        cell.set(2);
        scope.stop();
        settle();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_dependencies_are_dropped_each_run() {
        let picker = state(true);
        let left = state(1);
        let right = state(2);
        let runs = Arc::new(AtomicI32::new(0));

        let (picker_c, left_c, right_c) = (picker.clone(), left.clone(), right.clone());
        let runs_clone = runs.clone();
        let scope = watch(move || {
            if picker_c.get() {
                left_c.get();
            } else {
                right_c.get();
            }
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        scope.start();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        picker.set(false);
        settle();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // The left branch was not read on the latest run; mutating it must
        // not re-run the scope.
        left.set(10);
        settle();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        right.set(20);
        settle();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn child_scope_dies_when_the_parent_reruns() {
        let outer_dep = state(0);
        let inner_dep = state(0);
        let inner_runs = Arc::new(AtomicI32::new(0));

        let (outer_c, inner_c) = (outer_dep.clone(), inner_dep.clone());
        let inner_runs_clone = inner_runs.clone();
        let outer = watch(move || {
            outer_c.get();
            let inner_dep = inner_c.clone();
            let inner_runs = inner_runs_clone.clone();
            watch(move || {
                inner_dep.get();
                inner_runs.fetch_add(1, Ordering::SeqCst);
            })
            .start();
        });
        outer.start();
        assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

        // Re-running the outer scope replaces the inner one.
        outer_dep.set(1);
        settle();
        assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

        // Exactly one inner instance is alive: one re-run, not two.
        inner_dep.set(1);
        settle();
        assert_eq!(inner_runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stopping_an_ancestor_stops_the_whole_subtree() {
        let inner_dep = state(0);
        let inner_runs = Arc::new(AtomicI32::new(0));

        let inner_c = inner_dep.clone();
        let inner_runs_clone = inner_runs.clone();
        let outer = watch(move || {
            let mid_dep = inner_c.clone();
            let mid_runs = inner_runs_clone.clone();
            watch(move || {
                let inner_dep = mid_dep.clone();
                let inner_runs = mid_runs.clone();
                watch(move || {
                    inner_dep.get();
                    inner_runs.fetch_add(1, Ordering::SeqCst);
                })
                .start();
            })
            .start();
        });
        outer.start();
        assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

        outer.stop();

        inner_dep.set(1);
        settle();
        assert_eq!(inner_runs.load(Ordering::SeqCst), 1);
    }
}
