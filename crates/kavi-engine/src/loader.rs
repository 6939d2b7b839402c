//! Class loading seam
//!
//! Resolution and initialization are asynchronous: the loader may need to
//! fetch class data through the host before it can answer. Callers that hit
//! an unresolved class move their thread to `ASYNC_WAITING` and hand the
//! loader a continuation; the loader drives the thread back through the
//! `ASYNC_WAITING <-> RUNNABLE` pair when the continuation fires.

use crate::class::Class;
use crate::thread::JvmThread;
use crate::value::Value;
use std::sync::Arc;

/// Continuation for a batch resolution request. `Err` carries the Java-level
/// exception (e.g. a `NoClassDefFoundError`) raised by resolution.
pub type ResolveCallback = Box<dyn FnOnce(&Arc<JvmThread>, Result<(), Value>) + Send>;

/// Continuation for a class-initialization request. `Ok` hands back the
/// initialized class; `Err` carries the exception thrown by `<clinit>`.
pub type InitCallback = Box<dyn FnOnce(&Arc<JvmThread>, Result<Arc<Class>, Value>) + Send>;

/// The class loader operations the execution core consumes.
pub trait ClassLoader: Send + Sync {
    /// A class this loader has already resolved, by binary name.
    fn resolved_class(&self, name: &str) -> Option<Arc<Class>>;

    /// A class that is resolved *and* initialized. `thread` is the would-be
    /// initiating thread, used by loaders that track initialization states
    /// per thread.
    fn initialized_class(&self, thread: &Arc<JvmThread>, name: &str) -> Option<Arc<Class>>;

    /// Resolve every class in `names`, asynchronously. The callback fires at
    /// most once, after all names have been attempted.
    fn resolve_classes(&self, thread: &Arc<JvmThread>, names: &[String], on_done: ResolveCallback);

    /// Initialize `name` (resolving it first if needed), asynchronously.
    /// `init_static` requests `<clinit>` execution; bootstrap-phase callers
    /// pass `false` to defer static initializers.
    fn initialize_class(
        &self,
        thread: &Arc<JvmThread>,
        name: &str,
        on_done: InitCallback,
        init_static: bool,
    );
}
