//! Keyboard capture session
//!
//! Owns the pressed-key set, the callback registry, the hook and the two
//! background threads. `start()` and `stop()` move it between Stopped and
//! Running.

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::hook::KeyHook;
use super::keys::KeyId;
use super::registry::Callback;
use super::{capture, poll, KeyboardError, Pipeline};
use crate::dispatch::Dispatcher;
use crate::events::EventKind;
use crate::lifecycle::join_with_timeout;

/// Timing for the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardConfig {
    /// Interval between KeyHeld ticks
    pub poll_interval: Duration,
    /// Upper bound on waiting for each background thread in `stop()`
    pub join_timeout: Duration,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Background threads of a running session
struct SessionThreads {
    capture: JoinHandle<()>,
    poll: JoinHandle<()>,
    poll_stop: mpsc::Sender<()>,
}

/// Keyboard event manager: registration plus the capture session
pub struct KeyboardManager {
    pipeline: Pipeline,
    hook: Arc<dyn KeyHook>,
    config: KeyboardConfig,
    threads: Mutex<Option<SessionThreads>>,
}

impl KeyboardManager {
    /// Create a stopped manager scheduling onto `dispatcher`
    pub fn new(dispatcher: Dispatcher, hook: Arc<dyn KeyHook>, config: KeyboardConfig) -> Self {
        Self {
            pipeline: Pipeline::new(dispatcher),
            hook,
            config,
            threads: Mutex::new(None),
        }
    }

    /// Register `callback` for `kind` on `key`. Takes effect immediately,
    /// including while running.
    pub fn register(&self, kind: EventKind, key: KeyId, callback: Callback) {
        self.pipeline.registry.register(kind, key, callback);
    }

    /// Register with textual names (`"key_down"`, `"w"`). Unknown kinds fail
    /// with `InvalidArgument`.
    pub fn register_named(
        &self,
        kind: &str,
        key: &str,
        callback: Callback,
    ) -> Result<(), KeyboardError> {
        self.pipeline.registry.register_named(kind, key, callback)
    }

    /// Install the hook and spawn the capture and poll threads. A no-op if
    /// already running.
    pub fn start(&self) -> Result<(), KeyboardError> {
        let mut threads = self.lock_threads();
        if threads.is_some() {
            debug!("keyboard manager already running");
            return Ok(());
        }

        self.pipeline.running.store(true, Ordering::SeqCst);

        let (raw_tx, raw_rx) = mpsc::channel();
        let capture = match capture::spawn(self.pipeline.clone(), raw_rx) {
            Ok(handle) => handle,
            Err(e) => {
                self.pipeline.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        if let Err(e) = self.hook.install(raw_tx) {
            self.pipeline.running.store(false, Ordering::SeqCst);
            join_with_timeout(capture, self.config.join_timeout);
            return Err(e);
        }

        let (poll_stop, stop_rx) = mpsc::channel();
        let poll = match poll::spawn(self.pipeline.clone(), self.config.poll_interval, stop_rx) {
            Ok(handle) => handle,
            Err(e) => {
                self.pipeline.running.store(false, Ordering::SeqCst);
                self.hook.uninstall();
                join_with_timeout(capture, self.config.join_timeout);
                return Err(e);
            }
        };

        *threads = Some(SessionThreads {
            capture,
            poll,
            poll_stop,
        });

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            callbacks = self.pipeline.registry.len(),
            "keyboard capture started"
        );
        Ok(())
    }

    /// Stop the session: uninstall the hook, stop both threads (waiting at
    /// most `join_timeout` for each), discard callbacks queued but not yet
    /// started, and clear pressed keys and registrations.
    ///
    /// Blocks the calling thread; from async code run it through
    /// `tokio::task::spawn_blocking`.
    pub fn stop(&self) {
        let Some(threads) = self.lock_threads().take() else {
            debug!("keyboard manager not running");
            return;
        };

        self.pipeline.running.store(false, Ordering::SeqCst);
        self.hook.uninstall();
        let _ = threads.poll_stop.send(());

        let capture_joined = join_with_timeout(threads.capture, self.config.join_timeout);
        let poll_joined = join_with_timeout(threads.poll, self.config.join_timeout);
        if !(capture_joined && poll_joined) {
            warn!(capture_joined, poll_joined, "keyboard threads leaked on stop");
        }

        self.pipeline.dispatcher.advance_epoch();
        self.pipeline.state.clear();
        self.pipeline.registry.clear();

        info!(
            dropped_callbacks = self.pipeline.dispatcher.dropped(),
            "keyboard capture stopped"
        );
    }

    /// Check if the session is running
    pub fn is_running(&self) -> bool {
        self.lock_threads().is_some()
    }

    /// Keys currently held down
    pub fn pressed_keys(&self) -> Vec<KeyId> {
        self.pipeline.state.snapshot()
    }

    /// Number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.pipeline.registry.len()
    }

    /// Callbacks dropped by the dispatcher so far
    pub fn dropped_callbacks(&self) -> u64 {
        self.pipeline.dispatcher.dropped()
    }

    fn lock_threads(&self) -> MutexGuard<'_, Option<SessionThreads>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for KeyboardManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{self, Scheduler};
    use crate::keyboard::{callback, RawKeySender, SimulatedHook};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    struct Harness {
        manager: KeyboardManager,
        hook: Arc<SimulatedHook>,
        scheduler: Option<Scheduler>,
    }

    fn harness() -> Harness {
        let (dispatcher, scheduler) = dispatch::channel(1024);
        let hook = Arc::new(SimulatedHook::new());
        let manager = KeyboardManager::new(dispatcher, hook.clone(), KeyboardConfig::default());
        Harness {
            manager,
            hook,
            scheduler: Some(scheduler),
        }
    }

    impl Harness {
        fn spawn_scheduler(&mut self) {
            if let Some(scheduler) = self.scheduler.take() {
                tokio::spawn(scheduler.run());
            }
        }
    }

    fn sender(tx: &UnboundedSender<&'static str>, label: &'static str) -> Callback {
        let tx = tx.clone();
        callback(move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(label);
                Ok(())
            }
        })
    }

    async fn next(rx: &mut UnboundedReceiver<&'static str>) -> &'static str {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("callback did not run in time")
            .expect("callback channel closed")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_duplicate_down_fires_once() {
        let mut h = harness();
        h.spawn_scheduler();
        let (tx, mut rx) = unbounded_channel();
        h.manager.register(EventKind::KeyDown, KeyId::from("w"), sender(&tx, "down"));
        h.manager.register(EventKind::KeyUp, KeyId::from("w"), sender(&tx, "up"));
        h.manager.start().unwrap();

        assert!(h.hook.press("w"));
        assert!(h.hook.press("w"));
        assert!(h.hook.release("w"));

        assert_eq!(next(&mut rx).await, "down");
        assert_eq!(next(&mut rx).await, "up");
        settle().await;
        assert!(rx.try_recv().is_err());

        h.manager.stop();
    }

    #[tokio::test]
    async fn test_registration_order_is_invocation_order() {
        let mut h = harness();
        h.spawn_scheduler();
        let (tx, mut rx) = unbounded_channel();
        h.manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "first"));
        h.manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "second"));
        h.manager.start().unwrap();

        h.hook.press("a");

        assert_eq!(next(&mut rx).await, "first");
        assert_eq!(next(&mut rx).await, "second");
        h.manager.stop();
    }

    #[tokio::test]
    async fn test_held_key_rate() {
        let mut h = harness();
        h.spawn_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        h.manager.register(
            EventKind::KeyHeld,
            KeyId::from("s"),
            callback(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        h.manager.start().unwrap();

        h.hook.press("s");
        tokio::time::sleep(Duration::from_millis(105)).await;
        h.hook.release("s");
        settle().await;

        let held = count.load(Ordering::SeqCst);
        assert!((9..=11).contains(&held), "held fired {held} times");
        h.manager.stop();
    }

    #[tokio::test]
    async fn test_failing_callback_does_not_block_other_keys() {
        let mut h = harness();
        h.spawn_scheduler();
        let (tx, mut rx) = unbounded_channel();
        h.manager.register(
            EventKind::KeyDown,
            KeyId::from("x"),
            callback(|| async { anyhow::bail!("publish failed") }),
        );
        h.manager.register(EventKind::KeyDown, KeyId::from("y"), sender(&tx, "y"));
        h.manager.start().unwrap();

        h.hook.press("x");
        h.hook.press("y");

        assert_eq!(next(&mut rx).await, "y");
        h.manager.stop();
    }

    #[tokio::test]
    async fn test_no_callbacks_after_stop() {
        let mut h = harness();
        h.spawn_scheduler();
        let (tx, mut rx) = unbounded_channel();
        h.manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "a"));
        h.manager.start().unwrap();

        h.hook.press("a");
        assert_eq!(next(&mut rx).await, "a");

        h.manager.stop();
        assert!(!h.manager.is_running());
        assert!(h.manager.pressed_keys().is_empty());

        // The hardware keeps sending; nothing is queued
        assert!(!h.hook.release("a"));
        assert!(!h.hook.press("a"));
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_callbacks_discarded_by_stop() {
        // Scheduler not running yet, so everything stays queued
        let mut h = harness();
        let (tx, mut rx) = unbounded_channel();
        h.manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "a"));
        h.manager.start().unwrap();

        h.hook.press("a");
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.manager.stop();

        h.spawn_scheduler();
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let h = harness();
        h.manager.start().unwrap();
        h.manager.start().unwrap();
        assert!(h.manager.is_running());

        h.manager.stop();
        assert!(!h.manager.is_running());
        // Stopping again does nothing
        h.manager.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut h = harness();
        h.spawn_scheduler();
        let (tx, mut rx) = unbounded_channel();

        h.manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "first session"));
        h.manager.start().unwrap();
        h.manager.stop();
        assert_eq!(h.manager.callback_count(), 0);

        h.manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "second session"));
        h.manager.start().unwrap();
        h.hook.press("a");

        assert_eq!(next(&mut rx).await, "second session");
        h.manager.stop();
    }

    #[tokio::test]
    async fn test_register_named_rejects_unknown_kind() {
        let h = harness();
        let (tx, _rx) = unbounded_channel();

        let result = h.manager.register_named("key_double", "a", sender(&tx, "a"));
        assert!(matches!(result, Err(KeyboardError::InvalidArgument(_))));
        assert_eq!(h.manager.callback_count(), 0);
    }

    #[tokio::test]
    async fn test_submission_after_scheduler_shutdown_is_counted() {
        let (dispatcher, scheduler) = dispatch::channel(16);
        drop(scheduler);
        let hook = Arc::new(SimulatedHook::new());
        let manager = KeyboardManager::new(dispatcher, hook.clone(), KeyboardConfig::default());
        let (tx, _rx) = unbounded_channel();
        manager.register(EventKind::KeyDown, KeyId::from("a"), sender(&tx, "a"));
        manager.start().unwrap();

        hook.press("a");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.dropped_callbacks(), 1);
        manager.stop();
    }

    /// Keeps its sink on uninstall, so the capture thread only notices the
    /// stop on its next idle tick
    #[derive(Default)]
    struct StickyHook {
        sink: Mutex<Option<RawKeySender>>,
    }

    impl KeyHook for StickyHook {
        fn install(&self, sink: RawKeySender) -> Result<(), KeyboardError> {
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn uninstall(&self) {}
    }

    #[tokio::test]
    async fn test_stop_gives_up_on_slow_threads() {
        let (dispatcher, _scheduler) = dispatch::channel(16);
        let config = KeyboardConfig {
            poll_interval: Duration::from_millis(10),
            join_timeout: Duration::from_millis(1),
        };
        let manager = KeyboardManager::new(dispatcher, Arc::new(StickyHook::default()), config);
        manager.start().unwrap();

        let started = Instant::now();
        manager.stop();

        assert!(started.elapsed() < Duration::from_millis(80));
        assert!(!manager.is_running());
        assert!(manager.pressed_keys().is_empty());

        // The session can start again while the old capture thread winds down
        manager.start().unwrap();
        assert!(manager.is_running());
        manager.stop();
    }
}
