//! Best-effort thread joins
//!
//! `JoinHandle::join` has no timeout, so we poll `is_finished` until a
//! deadline. A thread still running at the deadline is left detached and
//! reported.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Join `handle`, waiting at most `timeout`. Returns true if the thread
/// exited; false if it was left running.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                thread = %name,
                timeout_ms = timeout.as_millis() as u64,
                "thread did not exit in time, leaving it detached"
            );
            return false;
        }
        thread::sleep(JOIN_POLL);
    }

    if handle.join().is_err() {
        warn!(thread = %name, "thread panicked before exit");
    } else {
        debug!(thread = %name, "thread joined");
    }
    true
}
