//! Cooperative scheduling
//!
//! One physical execution context, many logical threads. The pool picks the
//! next runnable thread round-robin; every scheduling decision crosses the
//! host tick queue so the host can service timers and IO between slices.

pub mod host;
pub mod pool;

pub use host::HostQueue;
pub use pool::{PoolConfig, PoolStats, ThreadPool, VmHooks};
