//! Thread pool and round-robin scheduler
//!
//! The pool owns every logical thread, picks the next runnable one
//! round-robin, keeps the signed park balance per thread, adapts the
//! per-slice resume budget toward the responsiveness target, and detects the
//! point where no non-daemon schedulable thread remains — at which point it
//! runs the JVM shutdown protocol and finally the empty callback.

use crate::bridge::JavaThreadBridge;
use crate::loader::ClassLoader;
use crate::opcode::OpcodeTable;
use crate::scheduler::host::HostQueue;
use crate::status::ThreadStatus;
use crate::thread::{JvmThread, ThreadId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Runtime hooks the embedding JVM installs on the pool.
pub trait VmHooks: Send + Sync {
    /// Invoke `java/lang/System.exit(0)` on behalf of `exiting`, whose
    /// identity is co-opted to run shutdown hooks. Fired once, when the last
    /// non-daemon schedulable thread terminates.
    fn system_exit(&self, pool: &Arc<ThreadPool>, exiting: &Arc<JvmThread>);
}

/// Pool tunables.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Target wall-clock duration of one uninterrupted run slice; the resume
    /// budget is adapted toward it.
    pub responsiveness: Duration,
    /// Starting value of the per-slice resume budget.
    pub initial_method_resumes: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            responsiveness: Duration::from_millis(1000),
            initial_method_resumes: 10_000,
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Registered threads.
    pub threads: usize,
    /// Threads eligible for the next scan.
    pub runnable: usize,
    /// Threads with a positive park balance.
    pub parked: usize,
}

/// Scheduling state guarded as one unit: the ordered thread list, the single
/// running thread, and the round-robin cursor.
struct ScheduleState {
    threads: Vec<Arc<JvmThread>>,
    running: Option<Arc<JvmThread>>,
    running_index: usize,
}

/// Adaptive resume budget, retuned by cumulative moving average.
struct ResumeBudget {
    max_method_resumes: u32,
    n_samples: u32,
}

/// The pool of logical threads multiplexed over one host context.
pub struct ThreadPool {
    state: Mutex<ScheduleState>,
    /// Signed park balance per thread. An unpark arriving before the park
    /// drives the balance negative and the park becomes a no-op.
    park_counts: Mutex<FxHashMap<ThreadId, i64>>,
    budget: Mutex<ResumeBudget>,
    config: PoolConfig,
    host: HostQueue,
    loader: Arc<dyn ClassLoader>,
    opcodes: Arc<OpcodeTable>,
    hooks: Mutex<Option<Arc<dyn VmHooks>>>,
    empty_callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    in_shutdown: AtomicBool,
    me: Weak<ThreadPool>,
}

impl ThreadPool {
    /// A pool dispatching through `opcodes` and resolving against `loader`.
    pub fn new(
        loader: Arc<dyn ClassLoader>,
        opcodes: Arc<OpcodeTable>,
        config: PoolConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            state: Mutex::new(ScheduleState {
                threads: Vec::new(),
                running: None,
                running_index: 0,
            }),
            park_counts: Mutex::new(FxHashMap::default()),
            budget: Mutex::new(ResumeBudget {
                max_method_resumes: config.initial_method_resumes.max(1),
                n_samples: 0,
            }),
            config,
            host: HostQueue::new(),
            loader,
            opcodes,
            hooks: Mutex::new(None),
            empty_callback: Mutex::new(None),
            in_shutdown: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    /// The host tick queue the embedder drains.
    pub fn host(&self) -> &HostQueue {
        &self.host
    }

    /// The bootstrap class loader threads resolve against.
    pub fn loader(&self) -> &Arc<dyn ClassLoader> {
        &self.loader
    }

    /// Install the runtime hooks.
    pub fn set_hooks(&self, hooks: Arc<dyn VmHooks>) {
        *self.hooks.lock() = Some(hooks);
    }

    /// Install the callback fired once the pool has fully drained.
    pub fn set_empty_callback(&self, callback: impl FnOnce() + Send + 'static) {
        *self.empty_callback.lock() = Some(Box::new(callback));
    }

    /// Record that JVM shutdown has been initiated externally
    /// (`System.exit` reached through Java code rather than pool accounting).
    pub fn begin_shutdown(&self) {
        self.in_shutdown.store(true, Ordering::Release);
    }

    /// True once shutdown has been initiated.
    pub fn in_shutdown(&self) -> bool {
        self.in_shutdown.load(Ordering::Acquire)
    }

    // =========================================================================
    // Thread creation
    // =========================================================================

    /// Create and register a thread in the `NEW` state.
    pub fn spawn_thread(&self, bridge: Arc<dyn JavaThreadBridge>) -> Arc<JvmThread> {
        self.spawn_inner(bridge, false)
    }

    /// Create and register an immortal bootstrap carrier thread.
    pub fn spawn_immortal_thread(&self, bridge: Arc<dyn JavaThreadBridge>) -> Arc<JvmThread> {
        self.spawn_inner(bridge, true)
    }

    fn spawn_inner(&self, bridge: Arc<dyn JavaThreadBridge>, immortal: bool) -> Arc<JvmThread> {
        let thread = JvmThread::new(
            self.me.clone(),
            Arc::clone(&self.loader),
            Arc::clone(&self.opcodes),
            bridge,
            immortal,
        );
        self.state.lock().threads.push(Arc::clone(&thread));
        thread
    }

    /// Re-admit a resurrected thread (a `TERMINATED -> *` transition).
    pub(crate) fn reregister(&self, thread: &Arc<JvmThread>) {
        let mut state = self.state.lock();
        if !state.threads.iter().any(|t| Arc::ptr_eq(t, thread)) {
            state.threads.push(Arc::clone(thread));
        }
    }

    /// Snapshot of the registered threads, in scan order.
    pub fn threads(&self) -> Vec<Arc<JvmThread>> {
        self.state.lock().threads.clone()
    }

    /// The currently running thread, if any.
    pub fn running_thread(&self) -> Option<Arc<JvmThread>> {
        self.state.lock().running.clone()
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            threads: state.threads.len(),
            runnable: state
                .threads
                .iter()
                .filter(|t| t.status() == ThreadStatus::Runnable)
                .count(),
            parked: state
                .threads
                .iter()
                .filter(|t| t.status() == ThreadStatus::Parked)
                .count(),
        }
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// A thread entered the scan set; schedule if the pool is idle.
    pub(crate) fn thread_runnable(&self, _thread: &Arc<JvmThread>) {
        if self.state.lock().running.is_none() {
            self.schedule_next_thread();
        }
    }

    /// Defer one scheduling decision to the next host tick. The scan starts
    /// one past the previous running slot, so a just-yielded thread goes to
    /// the back of the line. Finding no candidate is legal: the pool idles
    /// until an external event produces a runnable thread.
    pub fn schedule_next_thread(&self) {
        let pool = self.me.upgrade().expect("pool accessed through its Arc");
        self.host.post(move || {
            if let Some(thread) = pool.pick_next() {
                thread.set_status(ThreadStatus::Running);
                thread.run_loop();
            }
        });
    }

    fn pick_next(&self) -> Option<Arc<JvmThread>> {
        let mut state = self.state.lock();
        if state.running.is_some() || state.threads.is_empty() {
            return None;
        }
        let len = state.threads.len();
        for step in 1..=len {
            let index = (state.running_index + step) % len;
            if state.threads[index].status() == ThreadStatus::Runnable {
                let thread = Arc::clone(&state.threads[index]);
                state.running = Some(Arc::clone(&thread));
                state.running_index = index;
                return Some(thread);
            }
        }
        None
    }

    /// A running thread left `RUNNING` for a non-terminal state.
    pub(crate) fn thread_suspended(&self, thread: &Arc<JvmThread>) {
        let was_running = {
            let mut state = self.state.lock();
            if state
                .running
                .as_ref()
                .is_some_and(|running| Arc::ptr_eq(running, thread))
            {
                state.running = None;
                true
            } else {
                false
            }
        };
        if was_running {
            self.schedule_next_thread();
        }
    }

    /// A thread terminated: drop it from the pool and either keep scheduling,
    /// run the JVM shutdown protocol, or report the pool empty.
    pub(crate) fn thread_terminated(&self, thread: &Arc<JvmThread>) {
        let (has_non_daemon, has_immortal) = {
            let mut state = self.state.lock();
            if let Some(position) = state
                .threads
                .iter()
                .position(|t| Arc::ptr_eq(t, thread))
            {
                state.threads.remove(position);
                if position <= state.running_index && state.running_index > 0 {
                    state.running_index -= 1;
                }
            }
            if state
                .running
                .as_ref()
                .is_some_and(|running| Arc::ptr_eq(running, thread))
            {
                state.running = None;
            }
            let has_non_daemon = state
                .threads
                .iter()
                .any(|t| !t.is_daemon() && t.status().is_alive());
            let has_immortal = state.threads.iter().any(|t| t.is_immortal());
            (has_non_daemon, has_immortal)
        };
        self.park_counts.lock().remove(&thread.id());

        if has_non_daemon {
            self.schedule_next_thread();
            return;
        }

        if !self.in_shutdown.swap(true, Ordering::AcqRel) {
            let hooks = self.hooks.lock().clone();
            if let Some(hooks) = hooks {
                // Shutdown hooks run on the exiting thread's identity; the
                // pool hears about it again when they finish.
                let pool = self.me.upgrade().expect("pool accessed through its Arc");
                hooks.system_exit(&pool, thread);
                return;
            }
        }
        if !has_immortal {
            if let Some(callback) = self.empty_callback.lock().take() {
                callback();
            }
        }
    }

    // =========================================================================
    // Park / unpark
    // =========================================================================

    /// Consume a permit. Parks the thread iff the resulting balance is
    /// positive; a banked unpark makes this a no-op.
    pub fn park(&self, thread: &Arc<JvmThread>) {
        let count = {
            let mut counts = self.park_counts.lock();
            let entry = counts.entry(thread.id()).or_insert(0);
            *entry += 1;
            *entry
        };
        if count > 0 {
            thread.set_status(ThreadStatus::Parked);
        }
    }

    /// Bank a permit. Releases the thread once the balance reaches zero or
    /// below; unparking a thread that never parked banks the permit.
    pub fn unpark(&self, thread: &Arc<JvmThread>) {
        let count = {
            let mut counts = self.park_counts.lock();
            let entry = counts.entry(thread.id()).or_insert(0);
            *entry -= 1;
            *entry
        };
        if count <= 0 && thread.status() == ThreadStatus::Parked {
            thread.set_status(ThreadStatus::Runnable);
        }
    }

    /// Zero the balance and release the thread unconditionally.
    pub fn completely_unpark(&self, thread: &Arc<JvmThread>) {
        self.park_counts.lock().insert(thread.id(), 0);
        if thread.status() == ThreadStatus::Parked {
            thread.set_status(ThreadStatus::Runnable);
        }
    }

    /// The signed park balance for `thread`.
    pub fn park_count(&self, thread: &Arc<JvmThread>) -> i64 {
        self.park_counts
            .lock()
            .get(&thread.id())
            .copied()
            .unwrap_or(0)
    }

    // =========================================================================
    // Resume budget
    // =========================================================================

    /// The number of frame resumes a slice may burn before yielding.
    pub fn max_method_resumes(&self) -> u32 {
        self.budget.lock().max_method_resumes
    }

    /// Fold one observed slice duration into the budget: estimate the resume
    /// count that would have lasted the responsiveness target, then take the
    /// cumulative moving average with the previous budget.
    pub(crate) fn retune_resume_budget(&self, elapsed: Duration) {
        let mut budget = self.budget.lock();
        let elapsed_ms = (elapsed.as_secs_f64() * 1000.0).max(0.001);
        let target_ms = self.config.responsiveness.as_secs_f64() * 1000.0;
        let estimate = ((budget.max_method_resumes as f64 / elapsed_ms) * target_ms).floor();
        let samples = budget.n_samples as f64;
        let averaged =
            ((estimate + samples * budget.max_method_resumes as f64) / (samples + 1.0)).floor();
        budget.max_method_resumes = averaged.clamp(1.0, u32::MAX as f64) as u32;
        budget.n_samples += 1;
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ThreadPool")
            .field("threads", &stats.threads)
            .field("runnable", &stats.runnable)
            .field("in_shutdown", &self.in_shutdown())
            .finish()
    }
}
