//! Logical Java threads
//!
//! A `JvmThread` owns a stack of heterogeneous frames and a lifecycle status,
//! and carries the execution loop the scheduler drives. Threads are shared
//! (`Arc`) because frames, monitors, the loader and host continuations all
//! hold onto them; mutable state is interior. The pool owns its threads;
//! each thread holds a weak back-pointer to the pool.

use crate::bridge::JavaThreadBridge;
use crate::frame::{Frame, FrameKind, StackTraceFrame};
use crate::loader::ClassLoader;
use crate::monitor::Monitor;
use crate::opcode::OpcodeTable;
use crate::scheduler::pool::ThreadPool;
use crate::status::{transition_permitted, ThreadStatus};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Unique identifier for a thread; keys park accounting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

impl ThreadId {
    pub(crate) fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// One logical Java thread multiplexed onto the cooperative host.
pub struct JvmThread {
    id: ThreadId,
    /// Self-handle; frames, monitors and host continuations all need an
    /// owning reference to the thread they were called on.
    me: Weak<JvmThread>,
    status: Mutex<ThreadStatus>,
    stack: Mutex<Vec<Arc<Frame>>>,
    interrupted: AtomicBool,
    /// Bootstrap carrier threads are immortal: termination requests are
    /// silently dropped and the pool never reports empty while one exists.
    immortal: bool,
    /// The monitor this thread is blocked or waiting on, while it is.
    monitor_block: Mutex<Option<Arc<dyn Monitor>>>,
    bridge: Arc<dyn JavaThreadBridge>,
    pool: Weak<ThreadPool>,
    loader: Arc<dyn ClassLoader>,
    opcodes: Arc<OpcodeTable>,
}

impl JvmThread {
    pub(crate) fn new(
        pool: Weak<ThreadPool>,
        loader: Arc<dyn ClassLoader>,
        opcodes: Arc<OpcodeTable>,
        bridge: Arc<dyn JavaThreadBridge>,
        immortal: bool,
    ) -> Arc<Self> {
        let thread = Arc::new_cyclic(|me| Self {
            id: ThreadId::next(),
            me: me.clone(),
            status: Mutex::new(ThreadStatus::New),
            stack: Mutex::new(Vec::new()),
            interrupted: AtomicBool::new(false),
            immortal,
            monitor_block: Mutex::new(None),
            bridge,
            pool,
            loader,
            opcodes,
        });
        thread
            .bridge
            .set_status_field(ThreadStatus::New.jvmti().status_field());
        thread
    }

    fn me(&self) -> Arc<JvmThread> {
        self.me.upgrade().expect("thread accessed through its Arc")
    }

    /// This thread's id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ThreadStatus {
        *self.status.lock()
    }

    /// True for bootstrap carrier threads.
    pub fn is_immortal(&self) -> bool {
        self.immortal
    }

    /// The Java-visible daemon flag, read through the bridge.
    pub fn is_daemon(&self) -> bool {
        self.bridge.is_daemon()
    }

    /// The thread's `java/lang/Thread` bridge.
    pub fn bridge(&self) -> &Arc<dyn JavaThreadBridge> {
        &self.bridge
    }

    /// The bootstrap class loader this thread resolves against.
    pub fn loader(&self) -> &Arc<dyn ClassLoader> {
        &self.loader
    }

    /// The opcode dispatch table frames execute through.
    pub fn opcode_table(&self) -> &Arc<OpcodeTable> {
        &self.opcodes
    }

    /// The owning pool, unless it has been dropped.
    pub fn pool(&self) -> Option<Arc<ThreadPool>> {
        self.pool.upgrade()
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Request a status transition.
    ///
    /// Three requests are absorbed silently rather than applied: a no-change
    /// request, `TERMINATED` on an immortal thread, and `RUNNABLE` on a
    /// running thread (which stays `RUNNING` — this is what lets a native
    /// frame complete synchronously through [`JvmThread::async_return`]).
    /// Anything outside the permitted table fails loudly in debug builds.
    /// Accepted transitions mirror into the Java-visible `threadStatus` field
    /// and drive the pool's scheduling hooks.
    pub fn set_status(&self, new: ThreadStatus) {
        let old = {
            let mut status = self.status.lock();
            let old = *status;
            if new == old {
                return;
            }
            if self.immortal && new == ThreadStatus::Terminated {
                return;
            }
            if old == ThreadStatus::Running && new == ThreadStatus::Runnable {
                return;
            }
            debug_assert!(
                transition_permitted(old, new),
                "illegal thread transition {old:?} -> {new:?} on thread {}",
                self.id.as_u64(),
            );
            *status = new;
            old
        };
        self.bridge.set_status_field(new.jvmti().status_field());

        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let this = self.me();
        if old == ThreadStatus::Terminated {
            pool.reregister(&this);
        }
        match new {
            ThreadStatus::Runnable => pool.thread_runnable(&this),
            ThreadStatus::Terminated => pool.thread_terminated(&this),
            _ if old == ThreadStatus::Running => pool.thread_suspended(&this),
            _ => {}
        }
    }

    // =========================================================================
    // Interrupts
    // =========================================================================

    /// Raise the interrupt flag. Monitors observe the flag and drive waiting
    /// or blocked threads out themselves; a parked thread is released here,
    /// as a balancing unpark.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        if self.status() == ThreadStatus::Parked {
            if let Some(pool) = self.pool.upgrade() {
                pool.unpark(&self.me());
            }
        }
    }

    /// Read the interrupt flag without clearing it.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Read and clear the interrupt flag (the `Thread.interrupted()` contract).
    pub fn clear_interrupted(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    // =========================================================================
    // Monitor blocking
    // =========================================================================

    /// Record `monitor` as this thread's blocker and move to `status`
    /// (one of the four monitor-owned states). Called by monitors.
    pub fn block_on(&self, monitor: Arc<dyn Monitor>, status: ThreadStatus) {
        debug_assert!(
            matches!(
                status,
                ThreadStatus::Blocked
                    | ThreadStatus::UninterruptablyBlocked
                    | ThreadStatus::Waiting
                    | ThreadStatus::TimedWaiting
            ),
            "block_on with non-monitor status {status:?}",
        );
        *self.monitor_block.lock() = Some(monitor);
        self.set_status(status);
    }

    /// Clear the blocker and return to the scan set. Called by monitors on
    /// acquisition or wakeup.
    pub fn unblock(&self) {
        *self.monitor_block.lock() = None;
        self.set_status(ThreadStatus::Runnable);
    }

    /// The monitor this thread is currently blocked or waiting on.
    pub fn blocked_monitor(&self) -> Option<Arc<dyn Monitor>> {
        self.monitor_block.lock().clone()
    }

    // =========================================================================
    // Frame stack
    // =========================================================================

    /// Push a frame on top of the call stack.
    pub fn push_frame(&self, frame: Frame) {
        self.stack.lock().push(Arc::new(frame));
    }

    /// Pop the top frame.
    pub fn pop_frame(&self) -> Option<Arc<Frame>> {
        self.stack.lock().pop()
    }

    /// The top frame, if any.
    pub fn top_frame(&self) -> Option<Arc<Frame>> {
        self.stack.lock().last().cloned()
    }

    /// Call stack depth, internal frames included.
    pub fn stack_depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// The Java-visible stack trace, top frame first. Internal frames are
    /// projected out; native frames render at `pc == -1`.
    pub fn capture_stack_trace(&self) -> Vec<StackTraceFrame> {
        self.stack
            .lock()
            .iter()
            .rev()
            .filter_map(|frame| frame.stack_trace_frame())
            .collect()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// The execution loop, entered by the scheduler after a transition into
    /// `RUNNING`. Runs the top frame until the thread suspends or the stack
    /// drains, yielding to the host when the pool's resume budget is spent.
    pub fn run_loop(&self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let this = self.me();
        let mut resumes_left = pool.max_method_resumes();
        let start = Instant::now();

        while self.status() == ThreadStatus::Running {
            let Some(top) = self.top_frame() else {
                break;
            };
            if let Err(fault) = top.run(&this) {
                self.throw_new_exception("java/lang/InternalError", &fault.to_string());
                continue;
            }
            resumes_left -= 1;
            if resumes_left == 0 {
                pool.retune_resume_budget(start.elapsed());
                if self.status() == ThreadStatus::Running {
                    self.set_status(ThreadStatus::AsyncWaiting);
                    let thread = Arc::clone(&this);
                    pool.host()
                        .post(move || thread.set_status(ThreadStatus::Runnable));
                }
                break;
            }
        }

        if self.stack_depth() == 0
            && matches!(
                self.status(),
                ThreadStatus::Running | ThreadStatus::AsyncWaiting
            )
        {
            self.set_status(ThreadStatus::Terminated);
        }
    }

    /// Complete the top frame with a return value. Valid only from `RUNNING`,
    /// `RUNNABLE` or `ASYNC_WAITING`. Pops the frame, advances the caller's
    /// resumable point, and returns the thread to the scan set (a no-op while
    /// it is still running). An emptied stack terminates on the next
    /// scheduler pass.
    pub fn async_return(&self, rv: Option<Value>, rv2: Option<Value>) {
        debug_assert!(
            matches!(
                self.status(),
                ThreadStatus::Running | ThreadStatus::Runnable | ThreadStatus::AsyncWaiting
            ),
            "async_return from {:?}",
            self.status(),
        );
        let popped = self.pop_frame();
        debug_assert!(popped.is_some(), "async_return with an empty stack");
        if let Some(caller) = self.top_frame() {
            caller.schedule_resume(&self.me(), rv, rv2);
        }
        self.set_status(ThreadStatus::Runnable);
    }

    /// Throw `exception` on this thread. Valid only from `RUNNING`,
    /// `RUNNABLE` or `ASYNC_WAITING`. Unwinds frames until one handles the
    /// exception; an exhausted stack dispatches it as uncaught through the
    /// Thread object.
    pub fn throw_exception(&self, exception: Value) {
        debug_assert!(
            matches!(
                self.status(),
                ThreadStatus::Running | ThreadStatus::Runnable | ThreadStatus::AsyncWaiting
            ),
            "throw_exception from {:?}",
            self.status(),
        );
        // An internal frame cannot handle an exception thrown within its own
        // execution; unwinding starts beneath it.
        if let Some(top) = self.top_frame() {
            if top.kind() == FrameKind::Internal {
                self.pop_frame();
            }
        }
        // Handlers may themselves be asynchronous; start from the scan set.
        self.set_status(ThreadStatus::Runnable);
        let this = self.me();
        loop {
            let Some(top) = self.top_frame() else {
                self.bridge.dispatch_uncaught_exception(&this, exception);
                return;
            };
            if top.schedule_exception(&this, &exception) {
                return;
            }
            self.pop_frame();
        }
    }

    /// Construct and throw a new instance of `class_name`. If the class is
    /// not yet initialized the thread parks on the host while the loader
    /// initializes it; an exception from initialization replaces the one
    /// being constructed.
    pub fn throw_new_exception(&self, class_name: &str, message: &str) {
        let this = self.me();
        if let Some(class) = self.loader.initialized_class(&this, class_name) {
            self.throw_exception(Value::exception(class, message));
            return;
        }
        self.set_status(ThreadStatus::AsyncWaiting);
        let message = message.to_string();
        self.loader.initialize_class(
            &this,
            class_name,
            Box::new(move |thread, result| match result {
                Ok(class) => thread.throw_exception(Value::exception(class, &message)),
                Err(inner) => thread.throw_exception(inner),
            }),
            true,
        );
    }
}

impl std::fmt::Debug for JvmThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JvmThread")
            .field("id", &self.id.as_u64())
            .field("status", &self.status())
            .field("stack_depth", &self.stack_depth())
            .finish()
    }
}
