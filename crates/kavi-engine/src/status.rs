//! Thread lifecycle states and the permitted-transition table

/// The lifecycle state of a logical Java thread.
///
/// At most one thread pool-wide is `Running` at any time. The states beyond
/// Java's visible set exist because the host is cooperative: `AsyncWaiting`
/// marks a thread suspended mid-operation on a host continuation, and
/// `UninterruptablyBlocked` marks a notified/timed-out waiter that must
/// reacquire its monitor before anything else may happen to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    /// Created, never scheduled.
    New,
    /// Eligible for the round-robin scan.
    Runnable,
    /// The pool's single executing thread.
    Running,
    /// Queued for monitor entry; interruptible.
    Blocked,
    /// Reacquiring a monitor after notify/timeout; not interruptible.
    UninterruptablyBlocked,
    /// In a monitor's wait set, no timeout.
    Waiting,
    /// In a monitor's wait set with a timeout.
    TimedWaiting,
    /// Suspended on an asynchronous host operation.
    AsyncWaiting,
    /// Parked with a positive park balance.
    Parked,
    /// Call stack drained; removed from the pool.
    Terminated,
}

impl ThreadStatus {
    /// Every status, for exhaustive table checks.
    pub const ALL: [ThreadStatus; 10] = [
        ThreadStatus::New,
        ThreadStatus::Runnable,
        ThreadStatus::Running,
        ThreadStatus::Blocked,
        ThreadStatus::UninterruptablyBlocked,
        ThreadStatus::Waiting,
        ThreadStatus::TimedWaiting,
        ThreadStatus::AsyncWaiting,
        ThreadStatus::Parked,
        ThreadStatus::Terminated,
    ];

    /// The JVMTI projection exposed through `Thread.threadStatus`.
    pub fn jvmti(self) -> JvmtiThreadState {
        match self {
            ThreadStatus::New => JvmtiThreadState::Alive,
            ThreadStatus::Runnable | ThreadStatus::Running | ThreadStatus::AsyncWaiting => {
                JvmtiThreadState::Runnable
            }
            ThreadStatus::Blocked | ThreadStatus::UninterruptablyBlocked => {
                JvmtiThreadState::BlockedOnMonitorEnter
            }
            ThreadStatus::Waiting | ThreadStatus::Parked => JvmtiThreadState::WaitingIndefinitely,
            ThreadStatus::TimedWaiting => JvmtiThreadState::WaitingWithTimeout,
            ThreadStatus::Terminated => JvmtiThreadState::Terminated,
        }
    }

    /// True for states that keep a non-daemon thread counting toward JVM
    /// liveness: everything except `New` and `Terminated`.
    pub fn is_alive(self) -> bool {
        !matches!(self, ThreadStatus::New | ThreadStatus::Terminated)
    }
}

/// The four-and-a-bit JVMTI states Java introspection can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JvmtiThreadState {
    /// Alive but not yet started (`Thread.State.NEW`).
    Alive,
    /// Runnable, running, or parked on a host continuation.
    Runnable,
    /// Contending for a monitor.
    BlockedOnMonitorEnter,
    /// `Object.wait()` / park with no timeout.
    WaitingIndefinitely,
    /// `Object.wait(ms)` and friends.
    WaitingWithTimeout,
    /// Dead.
    Terminated,
}

impl JvmtiThreadState {
    /// The HotSpot `threadStatus` field encoding for this state.
    pub fn status_field(self) -> i32 {
        match self {
            JvmtiThreadState::Alive => 0x0000,
            JvmtiThreadState::Runnable => 0x0005,
            JvmtiThreadState::BlockedOnMonitorEnter => 0x0401,
            JvmtiThreadState::WaitingIndefinitely => 0x0191,
            JvmtiThreadState::WaitingWithTimeout => 0x01a1,
            JvmtiThreadState::Terminated => 0x0002,
        }
    }
}

/// The sparse table of legal status transitions. Everything not listed is a
/// programmer error; `JvmThread::set_status` asserts against this table in
/// debug builds. `Terminated` rows re-admit a thread for carrier reuse.
pub fn transition_permitted(from: ThreadStatus, to: ThreadStatus) -> bool {
    use ThreadStatus::*;
    matches!(
        (from, to),
        (New, Runnable | AsyncWaiting | Terminated)
            | (Runnable, Running | AsyncWaiting)
            | (Running, AsyncWaiting | Terminated | Blocked | Waiting | TimedWaiting | Parked)
            | (AsyncWaiting, Runnable | Terminated)
            | (Blocked, Runnable)
            | (Parked, Runnable)
            | (Waiting, Runnable | UninterruptablyBlocked)
            | (TimedWaiting, Runnable | UninterruptablyBlocked)
            | (UninterruptablyBlocked, Runnable)
            | (Terminated, New | Runnable | AsyncWaiting)
    )
}
