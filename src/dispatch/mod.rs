//! Cross-thread callback handoff
//!
//! The capture and poll threads hold a [`Dispatcher`] and submit callbacks
//! to it; the single consumer [`Scheduler`] runs them on the application's
//! current-thread runtime. Submissions from one thread keep their order.

mod dispatcher;
mod scheduler;

pub use dispatcher::Dispatcher;
pub use scheduler::{Scheduler, SchedulerStats};

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::KeyEvent;
use crate::keyboard::Callback;

/// Default number of jobs the queue holds before submissions are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A callback waiting to be started on the scheduler
struct Job {
    event: KeyEvent,
    callback: Callback,
    epoch: u64,
}

/// Counters shared by both halves
#[derive(Debug, Default)]
struct Shared {
    epoch: AtomicU64,
    dropped: AtomicU64,
}

/// Create a connected dispatcher/scheduler pair
pub fn channel(capacity: usize) -> (Dispatcher, Scheduler) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared::default());
    (
        Dispatcher::new(tx, Arc::clone(&shared)),
        Scheduler::new(rx, shared),
    )
}
