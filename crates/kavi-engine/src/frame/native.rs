//! Native frames
//!
//! A native frame wraps a host function exposed as a Java method. It runs
//! exactly once: the function either returns synchronously (the frame
//! completes through `async_return` while the thread is still running) or
//! suspends the thread to `ASYNC_WAITING` and completes later through
//! `thread.async_return(..)` from a host continuation.

use crate::frame::StackTraceFrame;
use crate::method::Method;
use crate::status::ThreadStatus;
use crate::thread::JvmThread;
use crate::value::Value;
use crate::ExecError;
use parking_lot::Mutex;
use std::sync::Arc;

/// A host function exposed as a Java method body. Returning `Ok(None)` means
/// "void, or completion arranged asynchronously"; the frame disambiguates by
/// inspecting the thread afterwards.
pub type NativeFn =
    Arc<dyn Fn(&Arc<JvmThread>, Vec<Value>) -> Result<Option<Value>, ExecError> + Send + Sync>;

/// One native method activation.
pub struct NativeFrame {
    method: Arc<Method>,
    native_fn: NativeFn,
    args: Mutex<Option<Vec<Value>>>,
}

impl NativeFrame {
    /// A frame for `method` invoked with `args`. Methods without a registered
    /// native function get a stub that throws `UnsatisfiedLinkError`.
    pub fn new(method: Arc<Method>, args: Vec<Value>) -> Self {
        let native_fn = method
            .native_fn()
            .cloned()
            .unwrap_or_else(|| unsatisfied_link_stub(method.full_signature()));
        Self {
            method,
            native_fn,
            args: Mutex::new(Some(args)),
        }
    }

    /// The wrapped method.
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    pub(crate) fn run(&self, thread: &Arc<JvmThread>) -> Result<(), ExecError> {
        let args = self.args.lock().take();
        debug_assert!(args.is_some(), "native frame ran twice");
        let args = self.method.convert_args(args.unwrap_or_default());

        let returned = (self.native_fn)(thread, args)?;

        // A still-running thread whose top method is still ours means the
        // native neither suspended nor unwound: synchronous return.
        let synchronous = thread.status() == ThreadStatus::Running
            && thread
                .top_frame()
                .and_then(|frame| frame.method().cloned())
                .is_some_and(|method| Arc::ptr_eq(&method, &self.method));
        if !synchronous {
            return Ok(());
        }

        match self.method.return_descriptor().as_bytes().first() {
            Some(b'V') => thread.async_return(None, None),
            Some(b'J') | Some(b'D') => {
                let rv = returned.unwrap_or_else(Value::null);
                thread.async_return(Some(rv), Some(Value::null()));
            }
            Some(b'Z') => {
                let rv = returned.unwrap_or(Value::Int(0)).coerce_boolean();
                thread.async_return(Some(rv), None);
            }
            _ => {
                let rv = returned.unwrap_or_else(Value::null);
                thread.async_return(Some(rv), None);
            }
        }
        Ok(())
    }

    pub(crate) fn schedule_resume(
        &self,
        _thread: &Arc<JvmThread>,
        _rv: Option<Value>,
        _rv2: Option<Value>,
    ) {
        // Natives consume callee results through host continuations, never
        // through a resumable point.
    }

    pub(crate) fn schedule_exception(
        &self,
        _thread: &Arc<JvmThread>,
        _exception: &Value,
    ) -> bool {
        false
    }

    pub(crate) fn stack_trace_frame(&self) -> StackTraceFrame {
        StackTraceFrame {
            method: Arc::clone(&self.method),
            pc: -1,
            stack: Vec::new(),
            locals: Vec::new(),
        }
    }
}

fn unsatisfied_link_stub(signature: String) -> NativeFn {
    Arc::new(move |thread, _args| {
        thread.throw_new_exception("java/lang/UnsatisfiedLinkError", &signature);
        Ok(None)
    })
}

impl std::fmt::Debug for NativeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFrame")
            .field("method", &self.method.full_signature())
            .finish()
    }
}
