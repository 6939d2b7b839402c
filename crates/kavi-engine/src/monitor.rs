//! Monitor seam
//!
//! Monitor internals (entry queues, wait sets, timed waits) live in the
//! synchronization crate. The execution core only needs to attempt entry on
//! `synchronized` method dispatch, release on unwind, and query which
//! sub-state a blocked thread is in when validating its status.

use crate::thread::JvmThread;
use std::sync::Arc;

/// Continuation invoked when a blocked entry attempt finally acquires.
pub type AcquireCallback = Box<dyn FnOnce(&Arc<JvmThread>) + Send>;

/// An intrinsic object monitor as seen by the execution core.
pub trait Monitor: Send + Sync {
    /// Attempt entry. Returns `true` on immediate acquisition. On contention
    /// the monitor blocks `thread` (driving it to `BLOCKED` and recording
    /// itself as the thread's blocker), arranges for `on_acquire` to run once
    /// the lock is granted, and returns `false`.
    fn enter(&self, thread: &Arc<JvmThread>, on_acquire: AcquireCallback) -> bool;

    /// Release one entry. Ownership is the monitor's to validate.
    fn exit(&self, thread: &Arc<JvmThread>);

    /// Wake every thread in the wait set.
    fn notify_all(&self, thread: &Arc<JvmThread>);

    /// True when `thread` sits in this monitor's wait set untimed.
    fn is_waiting(&self, thread: &Arc<JvmThread>) -> bool;

    /// True when `thread` sits in this monitor's wait set with a timeout.
    fn is_timed_waiting(&self, thread: &Arc<JvmThread>) -> bool;

    /// True when `thread` is queued for entry on this monitor.
    fn is_blocked(&self, thread: &Arc<JvmThread>) -> bool;
}
