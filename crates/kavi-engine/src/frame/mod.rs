//! Call-stack frames
//!
//! A thread's call stack holds three disjoint frame shapes behind one tagged
//! variant: bytecode frames drive the opcode dispatch loop, native frames
//! wrap host functions exposed as Java methods, and internal frames re-enter
//! the embedding runtime when a Java invocation finishes. All three answer
//! the same four-operation contract; dispatch is by discriminant, not vtable.

pub mod bytecode;
pub mod internal;
pub mod native;

pub use bytecode::BytecodeFrame;
pub use internal::InternalFrame;
pub use native::NativeFrame;

use crate::method::Method;
use crate::thread::JvmThread;
use crate::value::Value;
use crate::ExecError;
use std::sync::Arc;

/// Frame discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A method body of JVM bytecode.
    Bytecode,
    /// A host function exposed as a Java method.
    Native,
    /// A runtime-internal continuation frame.
    Internal,
}

/// One frame of a thread's call stack.
pub enum Frame {
    /// See [`BytecodeFrame`].
    Bytecode(BytecodeFrame),
    /// See [`NativeFrame`].
    Native(NativeFrame),
    /// See [`InternalFrame`].
    Internal(InternalFrame),
}

impl Frame {
    /// The frame's discriminant.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Bytecode(_) => FrameKind::Bytecode,
            Frame::Native(_) => FrameKind::Native,
            Frame::Internal(_) => FrameKind::Internal,
        }
    }

    /// The executing method; internal frames have none.
    pub fn method(&self) -> Option<&Arc<Method>> {
        match self {
            Frame::Bytecode(frame) => Some(frame.method()),
            Frame::Native(frame) => Some(frame.method()),
            Frame::Internal(_) => None,
        }
    }

    /// Execute until the frame pushes further frames, completes, or yields
    /// by moving the thread's status away from `RUNNING`.
    pub fn run(&self, thread: &Arc<JvmThread>) -> Result<(), ExecError> {
        match self {
            Frame::Bytecode(frame) => frame.run(thread),
            Frame::Native(frame) => frame.run(thread),
            Frame::Internal(frame) => frame.run(thread),
        }
    }

    /// A callee completed normally; advance this frame's resumable point and
    /// deliver the return value(s).
    pub fn schedule_resume(
        &self,
        thread: &Arc<JvmThread>,
        rv: Option<Value>,
        rv2: Option<Value>,
    ) {
        match self {
            Frame::Bytecode(frame) => frame.schedule_resume(thread, rv, rv2),
            Frame::Native(frame) => frame.schedule_resume(thread, rv, rv2),
            Frame::Internal(frame) => frame.schedule_resume(thread, rv, rv2),
        }
    }

    /// Consulted during unwinding. `true` means this frame handles (or has
    /// asynchronously arranged to handle) the exception and unwinding stops;
    /// `false` makes the unwinder pop it.
    pub fn schedule_exception(&self, thread: &Arc<JvmThread>, exception: &Value) -> bool {
        match self {
            Frame::Bytecode(frame) => frame.schedule_exception(thread, exception),
            Frame::Native(frame) => frame.schedule_exception(thread, exception),
            Frame::Internal(frame) => frame.schedule_exception(thread, exception),
        }
    }

    /// The Java-visible projection; `None` hides the frame from traces.
    pub fn stack_trace_frame(&self) -> Option<StackTraceFrame> {
        match self {
            Frame::Bytecode(frame) => Some(frame.stack_trace_frame()),
            Frame::Native(frame) => Some(frame.stack_trace_frame()),
            Frame::Internal(_) => None,
        }
    }
}

/// A Java-visible stack trace element, with the operand state snapshotted at
/// capture time. `pc == -1` denotes a native frame.
#[derive(Debug, Clone)]
pub struct StackTraceFrame {
    /// The executing method.
    pub method: Arc<Method>,
    /// Bytecode offset, or `-1` for native frames.
    pub pc: i32,
    /// Copy of the operand stack at capture time.
    pub stack: Vec<Value>,
    /// Copy of the local variables at capture time.
    pub locals: Vec<Value>,
}

impl StackTraceFrame {
    /// Render this element the way `Throwable.printStackTrace` would.
    pub fn render(&self) -> String {
        let class_name = self.method.class().name().replace('/', ".");
        let method_name = self.method.name();
        if self.pc < 0 {
            return format!("at {class_name}.{method_name}(Native Method)");
        }
        match (
            self.method.source_file(),
            self.method.line_number_at(self.pc as u32),
        ) {
            (Some(file), Some(line)) => format!("at {class_name}.{method_name}({file}:{line})"),
            (Some(file), None) => format!("at {class_name}.{method_name}({file})"),
            _ => format!("at {class_name}.{method_name}(Unknown Source)"),
        }
    }
}
