//! kavi VM thread and execution core
//!
//! This crate multiplexes logical Java threads over a single-threaded
//! cooperative host:
//! - Heterogeneous call-stack frames (bytecode, native, internal)
//! - Cooperative round-robin thread pool with an adaptive yield budget
//! - Java exception unwinding with asynchronous handler-class resolution
//! - HotSpot-compatible park/unpark accounting
//!
//! Opcode semantics, class loading, monitors and the object model live in
//! sibling crates and plug in through the seams in [`opcode`], [`loader`],
//! [`monitor`] and [`bridge`].

pub mod bridge;
pub mod class;
pub mod frame;
pub mod loader;
pub mod method;
pub mod monitor;
pub mod opcode;
pub mod scheduler;
pub mod status;
pub mod thread;
pub mod value;

pub use bridge::{DetachedThreadBridge, JavaThreadBridge};
pub use class::Class;
pub use frame::bytecode::BytecodeFrame;
pub use frame::internal::{InternalCallback, InternalFrame};
pub use frame::native::{NativeFn, NativeFrame};
pub use frame::{Frame, FrameKind, StackTraceFrame};
pub use loader::{ClassLoader, InitCallback, ResolveCallback};
pub use method::{Code, ExceptionTableEntry, LineNumberEntry, Method, MethodLockFn};
pub use monitor::{AcquireCallback, Monitor};
pub use opcode::{OpcodeFn, OpcodeLayout, OpcodeTable};
pub use scheduler::host::HostQueue;
pub use scheduler::pool::{PoolConfig, PoolStats, ThreadPool, VmHooks};
pub use status::{transition_permitted, JvmtiThreadState, ThreadStatus};
pub use thread::{JvmThread, ThreadId};
pub use value::{JavaObject, Value};

/// Host-level execution faults.
///
/// Java-level exceptions are [`Value`]s delivered through
/// [`JvmThread::throw_exception`]; this enum covers faults in the host
/// machinery itself. An `ExecError` escaping a frame terminates only the
/// offending thread (as a `java/lang/InternalError`), never the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// No handler registered in the opcode dispatch table.
    #[error("no handler registered for opcode {opcode:#04x} at pc {pc}")]
    UnknownOpcode {
        /// The unhandled opcode byte.
        opcode: u8,
        /// Byte offset the opcode was read from.
        pc: usize,
    },

    /// The program counter left the method's code attribute.
    #[error("pc {pc} out of bounds in {method}")]
    PcOutOfBounds {
        /// The offending byte offset.
        pc: usize,
        /// Full signature of the executing method.
        method: String,
    },

    /// An opcode popped more operand slots than were pushed.
    #[error("operand stack underflow in {method}")]
    OperandStackUnderflow {
        /// Full signature of the executing method.
        method: String,
    },

    /// A local-variable slot index exceeded `max_locals`.
    #[error("local slot {index} out of bounds in {method}")]
    LocalOutOfBounds {
        /// The offending slot index.
        index: usize,
        /// Full signature of the executing method.
        method: String,
    },

    /// A bytecode frame was built for a method without a code attribute.
    #[error("{method} has no code attribute")]
    MissingCode {
        /// Full signature of the method.
        method: String,
    },

    /// A synchronized method has no way to reach its intrinsic lock.
    #[error("synchronized method {method} has no lock provider")]
    MissingMethodLock {
        /// Full signature of the method.
        method: String,
    },

    /// A slot held a value of the wrong kind.
    #[error("expected a {expected} value, found {found}")]
    TypeMismatch {
        /// Kind the caller required.
        expected: &'static str,
        /// Kind actually present.
        found: &'static str,
    },
}
