//! Input capture thread
//!
//! Drains raw events from the hook, applies them to the pressed-key set and
//! schedules KeyDown/KeyUp callbacks on the down- and up-edges only.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, trace};

use super::hook::RawKeyEvent;
use super::{KeyboardError, Pipeline};
use crate::events::EventKind;

/// How often the capture thread re-checks the running flag while idle
const CAPTURE_TICK: Duration = Duration::from_millis(100);

pub(super) fn spawn(
    pipeline: Pipeline,
    raw_rx: Receiver<RawKeyEvent>,
) -> Result<JoinHandle<()>, KeyboardError> {
    thread::Builder::new()
        .name("key-capture".to_string())
        .spawn(move || run_capture_loop(&pipeline, raw_rx))
        .map_err(|e| KeyboardError::ThreadSpawn {
            name: "key-capture",
            reason: e.to_string(),
        })
}

fn run_capture_loop(pipeline: &Pipeline, raw_rx: Receiver<RawKeyEvent>) {
    info!("input capture thread started");

    while pipeline.running.load(Ordering::SeqCst) {
        match raw_rx.recv_timeout(CAPTURE_TICK) {
            Ok(event) => {
                if !pipeline.running.load(Ordering::SeqCst) {
                    debug!(?event, "discarding key event received after stop");
                    break;
                }
                handle_raw_event(pipeline, event);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("key hook detached");
                break;
            }
        }
    }

    info!("input capture thread stopped");
}

/// Apply one raw event. Returns the number of callbacks scheduled.
pub(super) fn handle_raw_event(pipeline: &Pipeline, event: RawKeyEvent) -> usize {
    let (kind, key) = match event {
        RawKeyEvent::Press(key) => {
            if !pipeline.state.mark_down(&key) {
                trace!(%key, "repeated press ignored");
                return 0;
            }
            (EventKind::KeyDown, key)
        }
        RawKeyEvent::Release(key) => {
            if !pipeline.state.mark_up(&key) {
                trace!(%key, "release without press ignored");
                return 0;
            }
            (EventKind::KeyUp, key)
        }
    };

    debug!(%kind, %key, "key transition");
    pipeline.dispatch_matching(kind, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::keyboard::{callback, Callback, KeyId};
    use std::sync::{Arc, Mutex};

    fn logger(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Callback {
        let log = Arc::clone(log);
        callback(move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(label);
                Ok(())
            }
        })
    }

    fn press(key: &str) -> RawKeyEvent {
        RawKeyEvent::Press(KeyId::from(key))
    }

    fn release(key: &str) -> RawKeyEvent {
        RawKeyEvent::Release(KeyId::from(key))
    }

    #[tokio::test]
    async fn test_duplicate_press_fires_once() {
        let (dispatcher, scheduler) = dispatch::channel(16);
        let pipeline = Pipeline::new(dispatcher);
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.registry.register(EventKind::KeyDown, KeyId::from("w"), logger(&log, "down"));
        pipeline.registry.register(EventKind::KeyUp, KeyId::from("w"), logger(&log, "up"));

        assert_eq!(handle_raw_event(&pipeline, press("w")), 1);
        assert_eq!(handle_raw_event(&pipeline, press("w")), 0);
        assert_eq!(handle_raw_event(&pipeline, release("w")), 1);

        drop(pipeline);
        scheduler.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["down", "up"]);
    }

    #[tokio::test]
    async fn test_release_without_press_ignored() {
        let (dispatcher, scheduler) = dispatch::channel(16);
        let pipeline = Pipeline::new(dispatcher);
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.registry.register(EventKind::KeyUp, KeyId::from("w"), logger(&log, "up"));

        assert_eq!(handle_raw_event(&pipeline, release("w")), 0);

        drop(pipeline);
        let stats = scheduler.run().await;
        assert_eq!(stats.launched, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_callbacks_fire_in_registration_order() {
        let (dispatcher, scheduler) = dispatch::channel(16);
        let pipeline = Pipeline::new(dispatcher);
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.registry.register(EventKind::KeyDown, KeyId::from("a"), logger(&log, "first"));
        pipeline.registry.register(EventKind::KeyDown, KeyId::from("a"), logger(&log, "second"));

        assert_eq!(handle_raw_event(&pipeline, press("a")), 2);

        drop(pipeline);
        scheduler.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unregistered_key_still_tracked() {
        let (dispatcher, _scheduler) = dispatch::channel(16);
        let pipeline = Pipeline::new(dispatcher);

        assert_eq!(handle_raw_event(&pipeline, press("z")), 0);
        assert!(pipeline.state.is_down(&KeyId::from("z")));
        handle_raw_event(&pipeline, release("z"));
        assert!(pipeline.state.is_empty());
    }

    #[test]
    fn test_capture_thread_exits_on_disconnect() {
        let (dispatcher, _scheduler) = dispatch::channel(16);
        let pipeline = Pipeline::new(dispatcher);
        pipeline.running.store(true, Ordering::SeqCst);

        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn(pipeline.clone(), rx).unwrap();
        tx.send(press("q")).unwrap();
        drop(tx);

        handle.join().unwrap();
        assert!(pipeline.state.is_down(&KeyId::from("q")));
    }
}
