//! Internal frames
//!
//! When the runtime invokes Java code (class initializers, reflective calls,
//! bootstrap plumbing) it pushes an internal frame beneath the Java frames.
//! The callee's completion lands on the internal frame via the resume or
//! exception contract; when the frame reaches the top of the stack its `run`
//! pops it, parks the thread on the host, and re-enters the runtime through
//! the stored continuation. Internal frames are invisible in stack traces.

use crate::status::ThreadStatus;
use crate::thread::JvmThread;
use crate::value::Value;
use crate::ExecError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Continuation re-entering the embedding runtime. Invoked as
/// `(thread, Some(exception), None)` when the Java call completed by
/// throwing, or `(thread, None, value)` on normal completion.
pub type InternalCallback = Box<dyn FnOnce(&Arc<JvmThread>, Option<Value>, Option<Value>) + Send>;

/// One runtime re-entry frame.
pub struct InternalFrame {
    /// `(is_exception, value)` recorded by the completion contract before
    /// this frame runs.
    outcome: Mutex<(bool, Option<Value>)>,
    callback: Mutex<Option<InternalCallback>>,
}

impl InternalFrame {
    /// A frame that re-enters the runtime through `callback`.
    pub fn new(callback: InternalCallback) -> Self {
        Self {
            outcome: Mutex::new((false, None)),
            callback: Mutex::new(Some(callback)),
        }
    }

    pub(crate) fn run(&self, thread: &Arc<JvmThread>) -> Result<(), ExecError> {
        let popped = thread.pop_frame();
        debug_assert!(
            matches!(popped.as_deref(), Some(crate::frame::Frame::Internal(_))),
            "internal frame ran while not on top",
        );
        thread.set_status(ThreadStatus::AsyncWaiting);

        let (is_exception, value) = std::mem::take(&mut *self.outcome.lock());
        let callback = self.callback.lock().take();
        debug_assert!(callback.is_some(), "internal frame ran twice");
        if let Some(callback) = callback {
            if is_exception {
                callback(thread, value, None);
            } else {
                callback(thread, None, value);
            }
        }
        Ok(())
    }

    pub(crate) fn schedule_resume(
        &self,
        _thread: &Arc<JvmThread>,
        rv: Option<Value>,
        _rv2: Option<Value>,
    ) {
        *self.outcome.lock() = (false, rv);
    }

    pub(crate) fn schedule_exception(&self, _thread: &Arc<JvmThread>, exception: &Value) -> bool {
        *self.outcome.lock() = (true, Some(exception.clone()));
        true
    }
}

impl std::fmt::Debug for InternalFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (is_exception, _) = *self.outcome.lock();
        f.debug_struct("InternalFrame")
            .field("is_exception", &is_exception)
            .finish()
    }
}
