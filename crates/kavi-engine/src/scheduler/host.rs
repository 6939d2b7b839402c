//! Host tick queue
//!
//! The cooperative host exposes exactly one primitive: "run this continuation
//! on a later tick". Scheduling decisions and responsiveness yields are
//! posted here instead of running inline, both to let the host service IO
//! between slices and to bound recursion depth — a synchronous scheduler
//! would re-enter itself once per context switch.
//!
//! The embedder drains the queue from its event loop: one continuation per
//! [`HostQueue::tick`], or [`HostQueue::run_until_idle`] to exhaustion.

use crossbeam::channel::{unbounded, Receiver, Sender};

type Continuation = Box<dyn FnOnce() + Send>;

/// The deferred-continuation queue standing in for the host event loop.
pub struct HostQueue {
    tx: Sender<Continuation>,
    rx: Receiver<Continuation>,
}

impl HostQueue {
    /// An empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Queue `continuation` for a later tick.
    pub fn post(&self, continuation: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(continuation));
    }

    /// Run one queued continuation. Returns `false` when the queue is idle.
    pub fn tick(&self) -> bool {
        match self.rx.try_recv() {
            Ok(continuation) => {
                continuation();
                true
            }
            Err(_) => false,
        }
    }

    /// Run queued continuations (and whatever they queue) until idle.
    /// Returns the number of ticks executed.
    pub fn run_until_idle(&self) -> usize {
        let mut ticks = 0;
        while self.tick() {
            ticks += 1;
        }
        ticks
    }

    /// True when nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new()
    }
}
