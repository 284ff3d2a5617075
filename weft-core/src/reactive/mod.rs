//! Reactive Primitives
//!
//! This module implements the core reactive system: writable cells,
//! derived cells, and tracked scopes, tied together by a thread-local
//! tracking context and a frame scheduler.
//!
//! # Concepts
//!
//! ## Writable cells (`state`)
//!
//! A [`State`] is a container for mutable state. When its value is read
//! inside a tracked scope, the cell automatically registers that scope as
//! a dependent. When the value changes, all dependents are re-run on the
//! next frame.
//!
//! ## Derived cells (`computed`)
//!
//! A [`Computed`] wraps a pure function of other cells. While it has
//! subscribers it keeps a cached value fresh and publishes only when the
//! result actually changes; without subscribers it recomputes on demand.
//!
//! ## Tracked scopes (`watch`)
//!
//! A [`Scope`] is a re-runnable action whose dependencies are discovered
//! on every run and discarded before the next. Scopes nest: a scope
//! created inside another scope's body dies when the parent re-runs.
//!
//! # Implementation Notes
//!
//! Dependency detection uses a thread-local context stack: running a scope
//! pushes it, and any cell read while it is on top subscribes the scope.
//! Change propagation is deferred and frame-batched, so any number of
//! mutations within one tick re-run an affected scope at most once. This
//! approach ("automatic dependency tracking") is the one used by SolidJS,
//! Vue 3, and Leptos.

mod computed;
mod context;
pub mod scheduler;
mod scope;
mod state;
mod subscribable;
mod value;

pub use computed::{computed, Computed};
pub use context::is_tracking;
pub use scope::{watch, Scope};
pub use state::{state, State};
pub use subscribable::{Callback, Observable, Subscribable, Subscription};
pub use value::{
    deep_resolve_value, resolve_value, Handler, ResolveError, Source, Value,
};
