//! `java/lang/Thread` object bridge
//!
//! Every `JvmThread` mirrors its state into a Java-visible `Thread` object:
//! the `threadStatus` int, the `daemon` flag, uncaught-exception dispatch and
//! the object's intrinsic monitor (used by `Thread.join`). The object model
//! lives elsewhere; this trait is the core's view of it.

use crate::monitor::Monitor;
use crate::thread::JvmThread;
use crate::value::Value;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// The slice of a `java/lang/Thread` instance the execution core touches.
pub trait JavaThreadBridge: Send + Sync {
    /// Write the `threadStatus` field (JVMTI encoding).
    fn set_status_field(&self, status: i32);

    /// Read the `threadStatus` field back.
    fn status_field(&self) -> i32;

    /// Read the `daemon` field.
    fn is_daemon(&self) -> bool;

    /// Invoke `dispatchUncaughtException(exception)` on the Thread object.
    fn dispatch_uncaught_exception(&self, thread: &Arc<JvmThread>, exception: Value);

    /// The Thread object's intrinsic monitor, absent while the thread is
    /// detached (no Java object yet).
    fn monitor(&self) -> Option<Arc<dyn Monitor>>;
}

/// Bridge for carrier threads that exist before `java/lang/Thread` is loaded
/// (the bootstrap phase). Mirrors the status field into a plain atomic and
/// drops uncaught exceptions on stderr.
pub struct DetachedThreadBridge {
    status: AtomicI32,
    daemon: bool,
}

impl DetachedThreadBridge {
    /// A detached bridge; `daemon` fixes the thread's daemon-ness until a
    /// real Thread object is attached by the runtime.
    pub fn new(daemon: bool) -> Arc<Self> {
        Arc::new(Self {
            status: AtomicI32::new(0),
            daemon,
        })
    }
}

impl JavaThreadBridge for DetachedThreadBridge {
    fn set_status_field(&self, status: i32) {
        self.status.store(status, Ordering::Release);
    }

    fn status_field(&self) -> i32 {
        self.status.load(Ordering::Acquire)
    }

    fn is_daemon(&self) -> bool {
        self.daemon
    }

    fn dispatch_uncaught_exception(&self, thread: &Arc<JvmThread>, exception: Value) {
        let class_name = exception
            .class_of()
            .map(|class| class.name().to_string())
            .unwrap_or_else(|| "<no class>".to_string());
        let message = exception
            .as_reference()
            .and_then(|object| object.message())
            .unwrap_or("");
        eprintln!(
            "[kavi] uncaught exception on detached thread {:?}: {class_name}: {message}",
            thread.id()
        );
    }

    fn monitor(&self) -> Option<Arc<dyn Monitor>> {
        None
    }
}
