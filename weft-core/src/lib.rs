//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive UI
//! framework. It implements:
//!
//! - Reactive primitives (writable cells, derived cells, tracked scopes)
//! - Frame-batched change propagation
//! - Value resolution for view-description trees
//! - A capability-keyed binder for external rendering layers
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: dependency tracking, cells, scopes, and the scheduler
//! - `bind`: the generic dispatch table a rendering layer populates to map
//!   view-description keys onto a live target
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::{computed, scheduler, state, watch};
//!
//! // Create a writable cell.
//! let count = state(0);
//!
//! // Create a derived value.
//! let count_for_doubled = count.clone();
//! let doubled = computed(move || count_for_doubled.get() * 2);
//!
//! // Create a watcher; it re-runs whenever a cell it read changes.
//! let scope = watch(move || {
//!     println!("doubled is {}", doubled.get());
//! });
//! scope.start();
//!
//! // Update the cell; the watcher re-runs on the next frame.
//! count.set(5);
//! scheduler::flush();
//! ```

pub mod bind;
pub mod reactive;
