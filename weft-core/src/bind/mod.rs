//! Capability-Keyed Binder
//!
//! A `Binder` maps a closed set of recognized view-description keys
//! ("classList", "children", "events", ...) to handler functions over some
//! rendering target. The binder itself knows nothing about rendering: a
//! binding layer registers its handlers at composition time, and `bind`
//! wires a target to a live source tree through a tracked scope.
//!
//! Each handler receives the target and the sub-source for its key, and
//! typically opens nested `watch` scopes of its own. Those nested scopes
//! die automatically when the outer binding re-runs, so handlers can
//! rebuild their slice of the target wholesale on every change.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::reactive::{resolve_value, watch, Scope, Source};

/// Handler for one recognized binding key.
pub type BindingFn<T> = Arc<dyn Fn(&T, &Source) + Send + Sync>;

/// A dispatch table from binding keys to handlers over targets of type
/// `T`.
///
/// Cloning shares the table.
pub struct Binder<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    bindings: Arc<RwLock<IndexMap<String, BindingFn<T>>>>,
}

impl<T> Binder<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    /// Create a binder with an empty dispatch table.
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Register (or replace) the handler for a binding key.
    pub fn define<F>(&self, key: impl Into<String>, binding: F)
    where
        F: Fn(&T, &Source) + Send + Sync + 'static,
    {
        self.bindings.write().insert(key.into(), Arc::new(binding));
    }

    /// Bind a target to a live source tree.
    ///
    /// Starts (and returns) a tracked scope that resolves the source and
    /// dispatches every recognized key to its handler. Cells read during
    /// resolution re-trigger the binding; unknown keys and non-map sources
    /// are skipped.
    pub fn bind(&self, target: Arc<T>, source: Source) -> Scope {
        let binder = self.clone();

        let scope = watch(move || {
            let value = resolve_value(&source);

            let Source::Map(entries) = value else {
                return;
            };

            for (key, sub_source) in entries.iter() {
                let binding = binder.bindings.read().get(key).cloned();

                match binding {
                    Some(binding) => binding(&target, sub_source),
                    None => trace!(key = %key, "no binding registered, skipping"),
                }
            }
        });

        scope.start();
        scope
    }
}

impl<T> Default for Binder<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Binder<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            bindings: Arc::clone(&self.bindings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{deep_resolve_value, scheduler, state, Value};
    use parking_lot::Mutex;

    fn settle() {
        let mut frames = 0;
        while scheduler::has_pending() {
            scheduler::flush();
            frames += 1;
            assert!(frames < 64, "reactive loop did not settle");
        }
    }

    /// Stand-in rendering target: records what handlers wrote to it.
    #[derive(Default)]
    struct FakeNode {
        text: Mutex<String>,
        classes: Mutex<Vec<String>>,
    }

    fn text_binder() -> Binder<FakeNode> {
        let binder = Binder::<FakeNode>::new();
        binder.define("text", |node, source| {
            if let Ok(Value::String(text)) = deep_resolve_value(source) {
                *node.text.lock() = text;
            }
        });
        binder
    }

    #[test]
    fn dispatches_recognized_keys_to_handlers() {
        let binder = text_binder();
        let node = Arc::new(FakeNode::default());

        let mut map = IndexMap::new();
        map.insert("text".to_owned(), Source::from("hello"));
        map.insert("unknown".to_owned(), Source::from(1));

        let _scope = binder.bind(node.clone(), Source::Map(map));
        assert_eq!(*node.text.lock(), "hello");
    }

    #[test]
    fn rebinds_when_a_source_cell_changes() {
        let binder = text_binder();
        let node = Arc::new(FakeNode::default());
        let text = state(Source::from("before"));

        let mut map = IndexMap::new();
        map.insert("text".to_owned(), Source::State(text.clone()));

        let _scope = binder.bind(node.clone(), Source::Map(map));
        assert_eq!(*node.text.lock(), "before");

        text.set(Source::from("after"));
        settle();
        assert_eq!(*node.text.lock(), "after");
    }

    #[test]
    fn whole_description_may_be_a_cell() {
        let binder = text_binder();
        let node = Arc::new(FakeNode::default());

        let mut home = IndexMap::new();
        home.insert("text".to_owned(), Source::from("home"));
        let mut other = IndexMap::new();
        other.insert("text".to_owned(), Source::from("other"));

        let view = state(Source::Map(home));
        let _scope = binder.bind(node.clone(), Source::State(view.clone()));
        assert_eq!(*node.text.lock(), "home");

        view.set(Source::Map(other));
        settle();
        assert_eq!(*node.text.lock(), "other");
    }

    #[test]
    fn list_entries_may_be_cells_of_their_own() {
        let binder = Binder::<FakeNode>::new();
        binder.define("classes", |node, source| {
            let Source::List(items) = resolve_value(source) else {
                return;
            };

            let mut classes = node.classes.lock();
            classes.clear();
            for item in &items {
                if let Source::String(class) = resolve_value(item) {
                    classes.push(class);
                }
            }
        });

        let node = Arc::new(FakeNode::default());
        let active = state(Source::from("on"));

        let mut map = IndexMap::new();
        map.insert(
            "classes".to_owned(),
            Source::List(vec![Source::from("base"), Source::State(active.clone())]),
        );

        let _scope = binder.bind(node.clone(), Source::Map(map));
        assert_eq!(*node.classes.lock(), vec!["base", "on"]);

        active.set(Source::from("off"));
        settle();
        assert_eq!(*node.classes.lock(), vec!["base", "off"]);
    }

    #[test]
    fn nested_handler_scopes_die_when_the_binding_reruns() {
        use std::sync::atomic::{AtomicI32, Ordering};

        let nested_runs = Arc::new(AtomicI32::new(0));

        // Handler that opens its own nested scope, the way a list or
        // children binding would.
        let binder = Binder::<FakeNode>::new();
        let nested_runs_clone = nested_runs.clone();
        binder.define("text", move |_node, source| {
            let source = source.clone();
            let nested_runs = nested_runs_clone.clone();
            watch(move || {
                resolve_value(&source);
                nested_runs.fetch_add(1, Ordering::SeqCst);
            })
            .start();
        });

        let node = Arc::new(FakeNode::default());
        let first_text = state(Source::from("x"));
        let second_text = state(Source::from("y"));

        let mut first = IndexMap::new();
        first.insert("text".to_owned(), Source::State(first_text.clone()));
        let mut second = IndexMap::new();
        second.insert("text".to_owned(), Source::State(second_text.clone()));

        let view = state(Source::Map(first));
        let _scope = binder.bind(node, Source::State(view.clone()));
        assert_eq!(nested_runs.load(Ordering::SeqCst), 1);

        // Re-running the outer binding replaces the handler's nested
        // scope.
        view.set(Source::Map(second));
        settle();
        assert_eq!(nested_runs.load(Ordering::SeqCst), 2);

        // The old nested scope is dead; only the replacement reacts.
        first_text.set(Source::from("stale"));
        settle();
        assert_eq!(nested_runs.load(Ordering::SeqCst), 2);

        second_text.set(Source::from("live"));
        settle();
        assert_eq!(nested_runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stopping_the_binding_scope_detaches_it() {
        let binder = text_binder();
        let node = Arc::new(FakeNode::default());
        let text = state(Source::from("before"));

        let mut map = IndexMap::new();
        map.insert("text".to_owned(), Source::State(text.clone()));

        let scope = binder.bind(node.clone(), Source::Map(map));
        scope.stop();

        text.set(Source::from("after"));
        settle();
        assert_eq!(*node.text.lock(), "before");
    }
}
