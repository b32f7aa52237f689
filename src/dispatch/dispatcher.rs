//! Producer half of the handoff

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use super::{Job, Shared};
use crate::events::KeyEvent;
use crate::keyboard::Callback;

/// Thread-safe handle used to schedule callbacks on the scheduler
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub(super) fn new(tx: mpsc::Sender<Job>, shared: Arc<Shared>) -> Self {
        Self { tx, shared }
    }

    /// Queue `callback` for execution on the scheduler thread.
    ///
    /// Never blocks. Returns false when the callback was dropped because the
    /// scheduler has shut down or the queue is full; both cases are logged
    /// and counted in [`Dispatcher::dropped`].
    pub fn submit(&self, event: KeyEvent, callback: Callback) -> bool {
        let job = Job {
            event,
            callback,
            epoch: self.shared.epoch.load(Ordering::SeqCst),
        };

        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Closed(job)) => {
                self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(event = %job.event, "scheduler shut down, callback dropped");
                false
            }
            Err(TrySendError::Full(job)) => {
                self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(event = %job.event, "dispatch queue full, callback dropped");
                false
            }
        }
    }

    /// Number of callbacks dropped since creation
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::SeqCst)
    }

    /// Invalidate everything queued so far. Jobs submitted before this call
    /// and not yet started are discarded by the scheduler.
    pub fn advance_epoch(&self) -> u64 {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(epoch, "dispatch epoch advanced");
        epoch
    }

    /// True once the scheduler has stopped accepting work
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("epoch", &self.shared.epoch.load(Ordering::SeqCst))
            .field("dropped", &self.dropped())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel;
    use crate::events::{EventKind, KeyEvent};
    use crate::keyboard::{callback, KeyId};

    fn noop_event() -> KeyEvent {
        KeyEvent::new(EventKind::KeyDown, KeyId::from("a"))
    }

    #[test]
    fn test_submit_after_scheduler_dropped() {
        let (dispatcher, scheduler) = channel(8);
        drop(scheduler);

        assert!(dispatcher.is_closed());
        assert!(!dispatcher.submit(noop_event(), callback(|| async { Ok(()) })));
        assert_eq!(dispatcher.dropped(), 1);
    }

    #[test]
    fn test_full_queue_drops() {
        let (dispatcher, _scheduler) = channel(1);

        assert!(dispatcher.submit(noop_event(), callback(|| async { Ok(()) })));
        assert!(!dispatcher.submit(noop_event(), callback(|| async { Ok(()) })));
        assert_eq!(dispatcher.dropped(), 1);
    }

    #[test]
    fn test_submit_from_other_thread() {
        let (dispatcher, _scheduler) = channel(8);
        let remote = dispatcher.clone();

        let accepted = std::thread::spawn(move || {
            remote.submit(noop_event(), callback(|| async { Ok(()) }))
        })
        .join()
        .unwrap();

        assert!(accepted);
        assert_eq!(dispatcher.dropped(), 0);
    }

    #[test]
    fn test_advance_epoch() {
        let (dispatcher, _scheduler) = channel(8);
        assert_eq!(dispatcher.advance_epoch(), 1);
        assert_eq!(dispatcher.advance_epoch(), 2);
    }
}
