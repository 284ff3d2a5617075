//! Frame Scheduler
//!
//! The scheduler batches reactive work into rendering frames. Publishing a
//! change never runs a callback synchronously; it enqueues the callback
//! here, and the whole batch drains once per frame.
//!
//! # How It Works
//!
//! 1. `enqueue` adds a callback to the pending batch, deduplicated by
//!    callback identity. A scope whose dependencies changed five times in
//!    one tick is still re-run once.
//!
//! 2. When the batch goes from empty to non-empty, the installed frame
//!    driver is asked for exactly one future frame.
//!
//! 3. `flush` (called by the host's frame callback) swaps the batch for an
//!    empty one and runs every swapped-out callback exactly once. Work
//!    enqueued *during* a flush lands in the next batch, never the one
//!    currently draining, so an update storm resolves one frame at a time
//!    instead of looping inside a single frame.
//!
//! # Thread Model
//!
//! The queue is thread-local, matching the reactive context stack: the
//! runtime is single-threaded and cooperative, and each thread gets an
//! independent scheduler.

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;
use tracing::trace;

use super::subscribable::{callback_id, Callback};

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new();
}

/// The host's "request a rendering frame" primitive.
///
/// The hook is invoked at most once per non-empty batch; the host is
/// expected to call [`flush`] once when the frame arrives.
type FrameDriver = Box<dyn Fn()>;

struct Scheduler {
    /// Callbacks waiting for the next frame, keyed by callback identity.
    pending: RefCell<IndexMap<usize, Callback>>,

    /// Set while a flush is draining, to reject re-entrant flushes.
    flushing: Cell<bool>,

    /// Optional frame-request hook.
    driver: RefCell<Option<FrameDriver>>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            pending: RefCell::new(IndexMap::new()),
            flushing: Cell::new(false),
            driver: RefCell::new(None),
        }
    }
}

/// Resets the flushing flag even if a drained callback panics.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Add a callback to the current pending batch.
///
/// Enqueuing the same callback (the same `Arc`) twice in one batch keeps a
/// single entry. If the batch was empty, the frame driver is asked for one
/// frame.
pub(crate) fn enqueue(callback: Callback) {
    SCHEDULER.with(|scheduler| {
        let was_empty = {
            let mut pending = scheduler.pending.borrow_mut();
            let was_empty = pending.is_empty();
            pending.insert(callback_id(&callback), callback);
            trace!(pending = pending.len(), "enqueued reactive callback");
            was_empty
        };

        if was_empty {
            if let Some(driver) = scheduler.driver.borrow().as_ref() {
                driver();
            }
        }
    });
}

/// Drain the pending batch, running every callback exactly once.
///
/// Callbacks enqueued while the flush is draining are deferred to the next
/// flush. Calling `flush` from within a draining callback is a no-op. A
/// panic in a callback propagates to the caller; the batch swap has already
/// happened, so the scheduler itself stays consistent.
pub fn flush() {
    SCHEDULER.with(|scheduler| {
        if scheduler.flushing.get() {
            return;
        }

        let ready = scheduler.pending.replace(IndexMap::new());
        if ready.is_empty() {
            return;
        }

        trace!(count = ready.len(), "flushing frame batch");
        scheduler.flushing.set(true);
        let _guard = FlushGuard(&scheduler.flushing);

        for (_, callback) in ready {
            callback();
        }
    });
}

/// Install the frame-request hook for this thread.
///
/// The hook is called whenever the pending batch becomes non-empty; the
/// host should arrange for [`flush`] to run once before the next repaint.
pub fn set_frame_driver<F>(driver: F)
where
    F: Fn() + 'static,
{
    SCHEDULER.with(|scheduler| {
        *scheduler.driver.borrow_mut() = Some(Box::new(driver));
    });
}

/// Remove the frame-request hook, if any.
pub fn clear_frame_driver() {
    SCHEDULER.with(|scheduler| {
        scheduler.driver.borrow_mut().take();
    });
}

/// Number of callbacks waiting for the next flush.
pub fn pending_count() -> usize {
    SCHEDULER.with(|scheduler| scheduler.pending.borrow().len())
}

/// Check whether any work is waiting for the next flush.
pub fn has_pending() -> bool {
    pending_count() > 0
}
