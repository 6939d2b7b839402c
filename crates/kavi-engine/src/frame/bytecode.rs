//! Bytecode frames
//!
//! A bytecode frame owns the program counter, operand stack and locals of one
//! method activation and drives the opcode dispatch loop. Mutable state is
//! interior: opcode handlers and the unwinder reach the frame through a
//! shared reference while it sits on the thread's stack.

use crate::frame::StackTraceFrame;
use crate::method::Method;
use crate::opcode;
use crate::status::ThreadStatus;
use crate::thread::JvmThread;
use crate::value::Value;
use crate::ExecError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One bytecode method activation.
pub struct BytecodeFrame {
    method: Arc<Method>,
    pc: AtomicUsize,
    stack: Mutex<Vec<Value>>,
    locals: Mutex<Vec<Value>>,
    /// Set by opcodes that suspend, invoke or throw; exits the dispatch loop.
    return_to_thread_loop: AtomicBool,
    /// True once synchronized entry has been initiated. Set optimistically
    /// when entry is attempted, so a `BLOCKED -> RUNNING` re-run does not
    /// re-enter the monitor.
    locked_method_lock: AtomicBool,
}

impl BytecodeFrame {
    /// A frame for `method` with `args` in the leading local slots. Fails if
    /// the method carries no code attribute.
    pub fn new(method: Arc<Method>, args: Vec<Value>) -> Result<Self, ExecError> {
        let code = method.code().ok_or_else(|| ExecError::MissingCode {
            method: method.full_signature(),
        })?;
        let mut locals = args;
        locals.resize(locals.len().max(code.max_locals as usize), Value::null());
        let max_stack = code.max_stack as usize;
        Ok(Self {
            method,
            pc: AtomicUsize::new(0),
            stack: Mutex::new(Vec::with_capacity(max_stack)),
            locals: Mutex::new(locals),
            return_to_thread_loop: AtomicBool::new(false),
            locked_method_lock: AtomicBool::new(false),
        })
    }

    /// The executing method.
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// Current bytecode offset.
    pub fn pc(&self) -> usize {
        self.pc.load(Ordering::Relaxed)
    }

    /// Move the bytecode offset.
    pub fn set_pc(&self, pc: usize) {
        self.pc.store(pc, Ordering::Relaxed);
    }

    /// Push one operand slot.
    pub fn push(&self, value: Value) {
        self.stack.lock().push(value);
    }

    /// Pop one operand slot.
    pub fn pop(&self) -> Result<Value, ExecError> {
        self.stack
            .lock()
            .pop()
            .ok_or_else(|| ExecError::OperandStackUnderflow {
                method: self.method.full_signature(),
            })
    }

    /// Peek the top operand slot.
    pub fn peek(&self) -> Option<Value> {
        self.stack.lock().last().cloned()
    }

    /// Operand stack depth.
    pub fn stack_depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Snapshot the operand stack, bottom first.
    pub fn stack_values(&self) -> Vec<Value> {
        self.stack.lock().clone()
    }

    /// Read local slot `index`.
    pub fn local(&self, index: usize) -> Result<Value, ExecError> {
        self.locals
            .lock()
            .get(index)
            .cloned()
            .ok_or_else(|| ExecError::LocalOutOfBounds {
                index,
                method: self.method.full_signature(),
            })
    }

    /// Write local slot `index`.
    pub fn set_local(&self, index: usize, value: Value) -> Result<(), ExecError> {
        let mut locals = self.locals.lock();
        match locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ExecError::LocalOutOfBounds {
                index,
                method: self.method.full_signature(),
            }),
        }
    }

    /// True once the dispatch loop has been asked to exit.
    pub fn return_to_thread_loop(&self) -> bool {
        self.return_to_thread_loop.load(Ordering::Relaxed)
    }

    /// Ask the dispatch loop to exit after the current opcode.
    pub fn set_return_to_thread_loop(&self, value: bool) {
        self.return_to_thread_loop.store(value, Ordering::Relaxed);
    }

    /// True once synchronized entry has been initiated for this activation.
    pub fn locked_method_lock(&self) -> bool {
        self.locked_method_lock.load(Ordering::Relaxed)
    }

    pub(crate) fn run(&self, thread: &Arc<JvmThread>) -> Result<(), ExecError> {
        if self.pc() == 0 && self.method.is_synchronized() && !self.locked_method_lock() {
            let monitor = self.method.method_lock(thread, self).ok_or_else(|| {
                ExecError::MissingMethodLock {
                    method: self.method.full_signature(),
                }
            })?;
            self.locked_method_lock.store(true, Ordering::Relaxed);
            if !monitor.enter(thread, Box::new(|_thread| {})) {
                // Entry blocked the thread; re-run resumes past this branch.
                return Ok(());
            }
        }

        self.set_return_to_thread_loop(false);

        let code = self.method.code().ok_or_else(|| ExecError::MissingCode {
            method: self.method.full_signature(),
        })?;
        let bytecode = Arc::clone(&code.bytecode);
        let table = Arc::clone(thread.opcode_table());
        loop {
            let pc = self.pc();
            table.dispatch(thread, self, &bytecode, pc)?;
            if self.return_to_thread_loop() {
                return Ok(());
            }
        }
    }

    pub(crate) fn schedule_resume(
        &self,
        _thread: &Arc<JvmThread>,
        rv: Option<Value>,
        rv2: Option<Value>,
    ) {
        let pc = self.pc();
        let opcode_byte = self
            .method
            .code()
            .and_then(|code| code.bytecode.get(pc).copied())
            .unwrap_or(0);
        let width = opcode::invoke_resume_width(opcode_byte);
        debug_assert!(
            width.is_some(),
            "resumed {} at non-invoke `{}` (pc {pc})",
            self.method.full_signature(),
            self.method
                .code()
                .map(|code| opcode::disassemble_at(&code.bytecode, pc))
                .unwrap_or_default(),
        );
        self.set_pc(pc + width.unwrap_or(3));

        let mut stack = self.stack.lock();
        if let Some(value) = rv {
            stack.push(value);
        }
        if let Some(value) = rv2 {
            stack.push(value);
        }
    }

    pub(crate) fn schedule_exception(&self, thread: &Arc<JvmThread>, exception: &Value) -> bool {
        let Some(code) = self.method.code() else {
            return false;
        };
        let Some(exception_class) = exception.class_of().cloned() else {
            debug_assert!(false, "threw a non-reference value");
            return false;
        };

        let pc = self.pc() as u32;
        // Catch types resolve against the method's defining loader;
        // bootstrap methods fall back to the thread's loader.
        let loader = self.method.loader().unwrap_or_else(|| thread.loader());
        let mut handler: Option<u32> = None;
        let mut hit_unresolved = false;

        for entry in &code.exception_table {
            if !(entry.start_pc <= pc && pc < entry.end_pc) {
                continue;
            }
            match &entry.catch_type {
                None => {
                    handler = Some(entry.handler_pc);
                    break;
                }
                Some(name) => {
                    if self.method.catch_type_failed(name) {
                        continue;
                    }
                    match loader.resolved_class(name) {
                        Some(catch_class) => {
                            if catch_class.is_assignable_from(&exception_class) {
                                handler = Some(entry.handler_pc);
                                break;
                            }
                        }
                        None => {
                            // Cannot decide this entry (or anything after it)
                            // until the catch type resolves.
                            hit_unresolved = true;
                            break;
                        }
                    }
                }
            }
        }

        if hit_unresolved {
            let unresolved: Vec<String> = code
                .exception_table
                .iter()
                .filter_map(|entry| entry.catch_type.clone())
                .filter(|name| {
                    !self.method.catch_type_failed(name) && loader.resolved_class(name).is_none()
                })
                .collect();
            thread.set_status(ThreadStatus::AsyncWaiting);
            let method = Arc::clone(&self.method);
            let names = unresolved.clone();
            let exception = exception.clone();
            loader.resolve_classes(
                thread,
                &unresolved,
                Box::new(move |thread, result| {
                    if result.is_err() {
                        method.mark_catch_types_failed(names);
                    }
                    thread.throw_exception(exception);
                }),
            );
            return true;
        }

        if let Some(handler_pc) = handler {
            let mut stack = self.stack.lock();
            stack.clear();
            stack.push(exception.clone());
            drop(stack);
            self.set_pc(handler_pc as usize);
            return true;
        }

        if self.method.is_synchronized() && self.locked_method_lock() {
            if let Some(monitor) = self.method.method_lock(thread, self) {
                monitor.exit(thread);
            }
        }
        false
    }

    pub(crate) fn stack_trace_frame(&self) -> StackTraceFrame {
        StackTraceFrame {
            method: Arc::clone(&self.method),
            pc: self.pc() as i32,
            stack: self.stack_values(),
            locals: self.locals.lock().clone(),
        }
    }
}

impl std::fmt::Debug for BytecodeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BytecodeFrame")
            .field("method", &self.method.full_signature())
            .field("pc", &self.pc())
            .field("stack_depth", &self.stack_depth())
            .finish()
    }
}
