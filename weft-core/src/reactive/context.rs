//! Tracking Context
//!
//! The context stack records which tracked scope is currently executing.
//! When a cell is read, the cell consults the stack top and registers that
//! scope as a dependent. Nested scopes (a `watch` opened inside another
//! `watch` body) push and pop in strict LIFO order.
//!
//! The stack is thread-local: the runtime is single-threaded and
//! cooperative, and the stack is only touched inside synchronous push/pop
//! pairs around a scope's run.

use std::cell::RefCell;
use std::sync::Arc;

use super::scope::ScopeCore;
use super::subscribable::{Callback, Observable};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ScopeRecord>> = const { RefCell::new(Vec::new()) };
}

/// The stack entry for a running tracked scope.
///
/// Carries the scope itself (so registered dependency subscriptions have
/// somewhere to live, and child scopes can link to the scope's re-run
/// publisher) and the re-run callback for the current run generation.
#[derive(Clone)]
pub(crate) struct ScopeRecord {
    scope: Arc<ScopeCore>,
    rerun: Callback,
}

impl ScopeRecord {
    pub(crate) fn new(scope: Arc<ScopeCore>, rerun: Callback) -> Self {
        Self { scope, rerun }
    }

    pub(crate) fn scope(&self) -> &Arc<ScopeCore> {
        &self.scope
    }

    /// Subscribe this scope's re-run callback to the given source and hold
    /// the subscription until the scope's next cleanup.
    pub(crate) fn register_dependency(&self, source: &dyn Observable) {
        let subscription = source.subscribe(self.rerun.clone());
        self.scope.hold_dependency(subscription);
    }
}

/// A clone of the record at the top of the stack, if a scope is running.
///
/// The record is cloned out rather than borrowed so that callers may push
/// further contexts (a tracked read of a cold derived cell starts a nested
/// scope) without holding the stack open.
pub(crate) fn active() -> Option<ScopeRecord> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Check whether any tracked scope is currently executing on this thread.
pub fn is_tracking() -> bool {
    CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Push a record for the duration of a scope's run.
///
/// The record pops when the returned guard drops, panic or not.
pub(crate) fn enter(record: ScopeRecord) -> ContextGuard {
    let scope = Arc::clone(&record.scope);
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(record));

    ContextGuard { scope }
}

/// Guard that pops the context stack when dropped.
pub(crate) struct ContextGuard {
    scope: Arc<ScopeCore>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched push/pop pairs early in debug builds.
            if let Some(record) = popped {
                debug_assert!(
                    Arc::ptr_eq(&record.scope, &self.scope),
                    "context stack popped a record for a different scope"
                );
            }
        });
    }
}
