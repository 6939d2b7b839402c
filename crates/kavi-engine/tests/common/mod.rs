//! Shared fixtures for the execution-core integration suites: an opcode
//! table with the handful of instructions the scenarios need, a class loader
//! with explicit async completion, a queue-based monitor, and a recording
//! Thread-object bridge.

#![allow(dead_code)]

use kavi_engine::{
    AcquireCallback, BytecodeFrame, Class, ClassLoader, Code, ExceptionTableEntry, ExecError,
    Frame, InitCallback, JavaThreadBridge, JvmThread, Method, Monitor, NativeFn, NativeFrame,
    OpcodeTable, PoolConfig, ResolveCallback, ThreadId, ThreadPool, ThreadStatus, Value,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// Thread-object bridge
// ============================================================================

pub struct TestBridge {
    status: AtomicI32,
    daemon: bool,
    pub uncaught: Mutex<Vec<Value>>,
}

impl TestBridge {
    pub fn new(daemon: bool) -> Arc<Self> {
        Arc::new(Self {
            status: AtomicI32::new(0),
            daemon,
            uncaught: Mutex::new(Vec::new()),
        })
    }

    pub fn uncaught_count(&self) -> usize {
        self.uncaught.lock().len()
    }
}

impl JavaThreadBridge for TestBridge {
    fn set_status_field(&self, status: i32) {
        self.status.store(status, Ordering::Release);
    }

    fn status_field(&self) -> i32 {
        self.status.load(Ordering::Acquire)
    }

    fn is_daemon(&self) -> bool {
        self.daemon
    }

    fn dispatch_uncaught_exception(&self, _thread: &Arc<JvmThread>, exception: Value) {
        self.uncaught.lock().push(exception);
    }

    fn monitor(&self) -> Option<Arc<dyn Monitor>> {
        None
    }
}

// ============================================================================
// Class loader with explicit async completion
// ============================================================================

type PendingResolve = (Vec<String>, Arc<JvmThread>, ResolveCallback);
type PendingInit = (String, Arc<JvmThread>, InitCallback);

pub struct TestLoader {
    resolved: Mutex<FxHashMap<String, Arc<Class>>>,
    initialized: Mutex<FxHashSet<String>>,
    /// Known to the loader but not yet resolved; async resolution finds these.
    staged: Mutex<FxHashMap<String, Arc<Class>>>,
    pending_resolves: Mutex<Vec<PendingResolve>>,
    pending_inits: Mutex<Vec<PendingInit>>,
}

impl TestLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            resolved: Mutex::new(FxHashMap::default()),
            initialized: Mutex::new(FxHashSet::default()),
            staged: Mutex::new(FxHashMap::default()),
            pending_resolves: Mutex::new(Vec::new()),
            pending_inits: Mutex::new(Vec::new()),
        })
    }

    /// Make `class` resolved and initialized immediately.
    pub fn define(&self, class: Arc<Class>) {
        self.initialized.lock().insert(class.name().to_string());
        self.resolved
            .lock()
            .insert(class.name().to_string(), class);
    }

    /// Make `class` reachable only through asynchronous resolution.
    pub fn stage(&self, class: Arc<Class>) {
        self.staged.lock().insert(class.name().to_string(), class);
    }

    pub fn pending_resolve_count(&self) -> usize {
        self.pending_resolves.lock().len()
    }

    /// Complete every pending resolution successfully.
    pub fn complete_resolves(&self) {
        let pending: Vec<_> = self.pending_resolves.lock().drain(..).collect();
        for (names, thread, on_done) in pending {
            for name in &names {
                if let Some(class) = self.staged.lock().remove(name) {
                    self.resolved.lock().insert(name.clone(), class);
                }
            }
            on_done(&thread, Ok(()));
        }
    }

    /// Fail every pending resolution.
    pub fn fail_resolves(&self) {
        let pending: Vec<_> = self.pending_resolves.lock().drain(..).collect();
        for (_names, thread, on_done) in pending {
            let error = Value::exception(
                Class::new("java/lang/NoClassDefFoundError", None),
                "resolution failed",
            );
            on_done(&thread, Err(error));
        }
    }

    /// Complete every pending initialization successfully.
    pub fn complete_inits(&self) {
        let pending: Vec<_> = self.pending_inits.lock().drain(..).collect();
        for (name, thread, on_done) in pending {
            if let Some(class) = self.staged.lock().remove(&name) {
                self.resolved.lock().insert(name.clone(), class);
            }
            let class = self
                .resolved
                .lock()
                .get(&name)
                .cloned()
                .unwrap_or_else(|| Class::new(name.as_str(), None));
            self.initialized.lock().insert(name);
            on_done(&thread, Ok(class));
        }
    }
}

impl ClassLoader for TestLoader {
    fn resolved_class(&self, name: &str) -> Option<Arc<Class>> {
        self.resolved.lock().get(name).cloned()
    }

    fn initialized_class(&self, _thread: &Arc<JvmThread>, name: &str) -> Option<Arc<Class>> {
        if self.initialized.lock().contains(name) {
            self.resolved.lock().get(name).cloned()
        } else {
            None
        }
    }

    fn resolve_classes(
        &self,
        thread: &Arc<JvmThread>,
        names: &[String],
        on_done: ResolveCallback,
    ) {
        self.pending_resolves
            .lock()
            .push((names.to_vec(), Arc::clone(thread), on_done));
    }

    fn initialize_class(
        &self,
        thread: &Arc<JvmThread>,
        name: &str,
        on_done: InitCallback,
        _init_static: bool,
    ) {
        if let Some(class) = self.initialized_class(thread, name) {
            on_done(thread, Ok(class));
            return;
        }
        self.pending_inits
            .lock()
            .push((name.to_string(), Arc::clone(thread), on_done));
    }
}

// ============================================================================
// Queue-based monitor
// ============================================================================

struct MonitorInner {
    owner: Option<ThreadId>,
    entries: u32,
    blocked: Vec<(Arc<JvmThread>, AcquireCallback)>,
    waiting: Vec<Arc<JvmThread>>,
    /// Notified waiters queued to reacquire the lock.
    reacquiring: Vec<Arc<JvmThread>>,
}

pub struct TestMonitor {
    me: Weak<TestMonitor>,
    inner: Mutex<MonitorInner>,
    enter_calls: AtomicUsize,
}

impl TestMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            inner: Mutex::new(MonitorInner {
                owner: None,
                entries: 0,
                blocked: Vec::new(),
                waiting: Vec::new(),
                reacquiring: Vec::new(),
            }),
            enter_calls: AtomicUsize::new(0),
        })
    }

    fn as_dyn(&self) -> Arc<dyn Monitor> {
        self.me.upgrade().expect("monitor alive")
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.inner.lock().owner
    }

    /// Times `enter` has been called; re-runs after a granted entry must not
    /// bump this.
    pub fn enter_calls(&self) -> usize {
        self.enter_calls.load(Ordering::Relaxed)
    }

    /// `Object.wait()`: release the lock and join the wait set.
    pub fn wait(&self, thread: &Arc<JvmThread>) {
        {
            let mut inner = self.inner.lock();
            assert_eq!(inner.owner, Some(thread.id()), "wait without ownership");
            inner.owner = None;
            inner.entries = 0;
            inner.waiting.push(Arc::clone(thread));
        }
        thread.block_on(self.as_dyn(), ThreadStatus::Waiting);
        self.grant_next();
    }

    fn grant_next(&self) {
        let granted = {
            let mut inner = self.inner.lock();
            if inner.owner.is_some() {
                None
            } else if !inner.reacquiring.is_empty() {
                let thread = inner.reacquiring.remove(0);
                inner.owner = Some(thread.id());
                inner.entries = 1;
                Some((thread, None))
            } else if !inner.blocked.is_empty() {
                let (thread, on_acquire) = inner.blocked.remove(0);
                inner.owner = Some(thread.id());
                inner.entries = 1;
                Some((thread, Some(on_acquire)))
            } else {
                None
            }
        };
        if let Some((thread, on_acquire)) = granted {
            if let Some(on_acquire) = on_acquire {
                on_acquire(&thread);
            }
            thread.unblock();
        }
    }
}

impl Monitor for TestMonitor {
    fn enter(&self, thread: &Arc<JvmThread>, on_acquire: AcquireCallback) -> bool {
        self.enter_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        match inner.owner {
            None => {
                inner.owner = Some(thread.id());
                inner.entries = 1;
                true
            }
            Some(owner) if owner == thread.id() => {
                inner.entries += 1;
                true
            }
            Some(_) => {
                inner.blocked.push((Arc::clone(thread), on_acquire));
                drop(inner);
                thread.block_on(self.as_dyn(), ThreadStatus::Blocked);
                false
            }
        }
    }

    fn exit(&self, thread: &Arc<JvmThread>) {
        let released = {
            let mut inner = self.inner.lock();
            assert_eq!(inner.owner, Some(thread.id()), "exit without ownership");
            inner.entries -= 1;
            if inner.entries == 0 {
                inner.owner = None;
                true
            } else {
                false
            }
        };
        if released {
            self.grant_next();
        }
    }

    fn notify_all(&self, _thread: &Arc<JvmThread>) {
        let woken: Vec<_> = self.inner.lock().waiting.drain(..).collect();
        for thread in woken {
            self.inner.lock().reacquiring.push(Arc::clone(&thread));
            thread.set_status(ThreadStatus::UninterruptablyBlocked);
        }
        self.grant_next();
    }

    fn is_waiting(&self, thread: &Arc<JvmThread>) -> bool {
        self.inner
            .lock()
            .waiting
            .iter()
            .any(|t| Arc::ptr_eq(t, thread))
    }

    fn is_timed_waiting(&self, _thread: &Arc<JvmThread>) -> bool {
        false
    }

    fn is_blocked(&self, thread: &Arc<JvmThread>) -> bool {
        let inner = self.inner.lock();
        inner.blocked.iter().any(|(t, _)| Arc::ptr_eq(t, thread))
            || inner.reacquiring.iter().any(|t| Arc::ptr_eq(t, thread))
    }
}

// ============================================================================
// Method registry for the test invoke opcodes
// ============================================================================

thread_local! {
    static METHOD_REGISTRY: RefCell<Vec<Arc<Method>>> = const { RefCell::new(Vec::new()) };
    pub static RUN_LOG: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Register a callee for the test invoke opcodes; returns its index.
pub fn register_method(method: Arc<Method>) -> u16 {
    METHOD_REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        registry.push(method);
        (registry.len() - 1) as u16
    })
}

fn lookup_method(index: u16) -> Arc<Method> {
    METHOD_REGISTRY.with(|registry| registry.borrow()[index as usize].clone())
}

pub fn run_log() -> Vec<u64> {
    RUN_LOG.with(|log| log.borrow().clone())
}

// ============================================================================
// Opcode handlers
// ============================================================================

fn op_nop(
    _thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    pc: usize,
) -> Result<(), ExecError> {
    frame.set_pc(pc + 1);
    Ok(())
}

fn op_bipush(
    _thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    code: &[u8],
    pc: usize,
) -> Result<(), ExecError> {
    frame.push(Value::Int(code[pc + 1] as i8 as i32));
    frame.set_pc(pc + 2);
    Ok(())
}

fn push_callee(thread: &Arc<JvmThread>, method: Arc<Method>) -> Result<(), ExecError> {
    if method.is_native() {
        thread.push_frame(Frame::Native(NativeFrame::new(method, Vec::new())));
    } else {
        thread.push_frame(Frame::Bytecode(BytecodeFrame::new(method, Vec::new())?));
    }
    Ok(())
}

/// `invokestatic`: callee index in the two operand bytes. `pc` stays on the
/// invoke; the callee's completion advances it.
fn op_invokestatic(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    code: &[u8],
    pc: usize,
) -> Result<(), ExecError> {
    let index = u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
    frame.set_return_to_thread_loop(true);
    push_callee(thread, lookup_method(index))
}

/// `invokeinterface`: same, with the five-byte encoding.
fn op_invokeinterface(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    code: &[u8],
    pc: usize,
) -> Result<(), ExecError> {
    let index = u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
    frame.set_return_to_thread_loop(true);
    push_callee(thread, lookup_method(index))
}

fn exit_method_lock_if_held(thread: &Arc<JvmThread>, frame: &BytecodeFrame) {
    if frame.method().is_synchronized() && frame.locked_method_lock() {
        if let Some(monitor) = frame.method().method_lock(thread, frame) {
            monitor.exit(thread);
        }
    }
}

fn op_return(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    _pc: usize,
) -> Result<(), ExecError> {
    frame.set_return_to_thread_loop(true);
    exit_method_lock_if_held(thread, frame);
    thread.async_return(None, None);
    Ok(())
}

fn op_ireturn(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    _pc: usize,
) -> Result<(), ExecError> {
    frame.set_return_to_thread_loop(true);
    let rv = frame.pop()?;
    exit_method_lock_if_held(thread, frame);
    thread.async_return(Some(rv), None);
    Ok(())
}

fn op_athrow(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    _pc: usize,
) -> Result<(), ExecError> {
    frame.set_return_to_thread_loop(true);
    let exception = frame.pop()?;
    thread.throw_exception(exception);
    Ok(())
}

/// Test-only cooperative yield (`impdep1`): log the thread, step past the
/// opcode, and hop through the host queue back to the scan set.
fn op_coop_yield(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    pc: usize,
) -> Result<(), ExecError> {
    RUN_LOG.with(|log| log.borrow_mut().push(thread.id().as_u64()));
    frame.set_pc(pc + 1);
    frame.set_return_to_thread_loop(true);
    thread.set_status(ThreadStatus::AsyncWaiting);
    let resumed = Arc::clone(thread);
    thread
        .pool()
        .expect("pool alive")
        .host()
        .post(move || resumed.set_status(ThreadStatus::Runnable));
    Ok(())
}

/// Test-only freeze (`impdep2`): suspend with no wakeup arranged, leaving
/// frame state inspectable.
fn op_freeze(
    thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    _pc: usize,
) -> Result<(), ExecError> {
    frame.set_return_to_thread_loop(true);
    thread.set_status(ThreadStatus::AsyncWaiting);
    Ok(())
}

/// Test-only spin (`breakpoint`): return to the thread loop with the thread
/// still running and `pc` unmoved, to exercise the resume budget.
fn op_spin(
    _thread: &Arc<JvmThread>,
    frame: &BytecodeFrame,
    _code: &[u8],
    _pc: usize,
) -> Result<(), ExecError> {
    frame.set_return_to_thread_loop(true);
    Ok(())
}

pub fn test_opcode_table() -> Arc<OpcodeTable> {
    let mut table = OpcodeTable::new();
    table.register(0x00, op_nop);
    table.register(0x10, op_bipush);
    table.register(0xac, op_ireturn);
    table.register(0xb1, op_return);
    table.register(0xb8, op_invokestatic);
    table.register(0xb9, op_invokeinterface);
    table.register(0xbf, op_athrow);
    table.register(0xca, op_spin);
    table.register(0xfe, op_coop_yield);
    table.register(0xff, op_freeze);
    Arc::new(table)
}

// ============================================================================
// Natives
// ============================================================================

/// `Unsafe.park`: complete the native frame, then consume a permit.
pub fn park_native() -> NativeFn {
    Arc::new(|thread, _args| {
        thread.async_return(None, None);
        thread.pool().expect("pool alive").park(thread);
        Ok(None)
    })
}

/// `Unsafe.unpark(target)`.
pub fn unpark_native(target: Arc<JvmThread>) -> NativeFn {
    Arc::new(move |thread, _args| {
        thread.pool().expect("pool alive").unpark(&target);
        Ok(None)
    })
}

/// A native that completes asynchronously from a host continuation.
pub fn async_answer_native(answer: i32) -> NativeFn {
    Arc::new(move |thread, _args| {
        thread.set_status(ThreadStatus::AsyncWaiting);
        let resumed = Arc::clone(thread);
        thread
            .pool()
            .expect("pool alive")
            .host()
            .post(move || resumed.async_return(Some(Value::Int(answer)), None));
        Ok(None)
    })
}

// ============================================================================
// Builders
// ============================================================================

pub fn throwable_hierarchy(loader: &TestLoader) -> Arc<Class> {
    let object = Class::new("java/lang/Object", None);
    let throwable = Class::new("java/lang/Throwable", Some(object.clone()));
    loader.define(object);
    loader.define(throwable.clone());
    throwable
}

pub fn bytecode_method(
    class: &Arc<Class>,
    name: &str,
    descriptor: &str,
    flags: u16,
    bytecode: &[u8],
    exception_table: Vec<ExceptionTableEntry>,
) -> Arc<Method> {
    Arc::new(
        Method::new(Arc::clone(class), name, descriptor, flags).with_code(Code {
            max_stack: 8,
            max_locals: 4,
            bytecode: Arc::from(bytecode),
            exception_table,
            line_numbers: None,
        }),
    )
}

pub fn native_method(
    class: &Arc<Class>,
    name: &str,
    descriptor: &str,
    native_fn: NativeFn,
) -> Arc<Method> {
    Arc::new(
        Method::new(
            Arc::clone(class),
            name,
            descriptor,
            kavi_engine::method::ACC_NATIVE,
        )
        .with_native(native_fn),
    )
}

pub fn test_pool(loader: Arc<TestLoader>) -> Arc<ThreadPool> {
    ThreadPool::new(loader, test_opcode_table(), PoolConfig::default())
}

/// Spawn a thread, push a frame for `method`, and request its first run.
pub fn start_thread(
    pool: &Arc<ThreadPool>,
    bridge: Arc<TestBridge>,
    method: Arc<Method>,
) -> Arc<JvmThread> {
    let thread = pool.spawn_thread(bridge);
    thread.push_frame(Frame::Bytecode(
        BytecodeFrame::new(method, Vec::new()).expect("method has code"),
    ));
    thread.set_status(ThreadStatus::Runnable);
    thread
}

/// Drain the host queue.
pub fn pump(pool: &Arc<ThreadPool>) -> usize {
    pool.host().run_until_idle()
}
