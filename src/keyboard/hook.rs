//! OS key hooks
//!
//! `RdevHook` listens system-wide through rdev. rdev's listener can only be
//! started once per process and never returns, so its thread is spawned on
//! first install and forwards to whichever sink is attached; uninstalling
//! detaches the sink. `SimulatedHook` is driven programmatically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use rdev::{listen, Event, EventType};
use tracing::{debug, error, info};

use super::keys::{resolve, KeyId};
use super::KeyboardError;

/// Raw notification delivered by a hook, already resolved to a key id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKeyEvent {
    Press(KeyId),
    Release(KeyId),
}

/// Channel end a hook delivers raw events into
pub type RawKeySender = mpsc::Sender<RawKeyEvent>;

/// Source of raw key press/release notifications
pub trait KeyHook: Send + Sync {
    /// Start delivering events into `sink`, replacing any previous sink
    fn install(&self, sink: RawKeySender) -> Result<(), KeyboardError>;

    /// Stop delivering events. Events arriving afterwards are discarded.
    fn uninstall(&self);
}

static RDEV_SINK: Mutex<Option<RawKeySender>> = Mutex::new(None);
static RDEV_THREAD_SPAWNED: AtomicBool = AtomicBool::new(false);

fn sink_lock(sink: &Mutex<Option<RawKeySender>>) -> MutexGuard<'_, Option<RawKeySender>> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// System-wide keyboard hook backed by rdev
#[derive(Debug, Default, Clone, Copy)]
pub struct RdevHook;

impl RdevHook {
    pub fn new() -> Self {
        Self
    }
}

impl KeyHook for RdevHook {
    fn install(&self, sink: RawKeySender) -> Result<(), KeyboardError> {
        *sink_lock(&RDEV_SINK) = Some(sink);

        // Only spawn the listener once per process
        if RDEV_THREAD_SPAWNED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("rdev listener already running, sink attached");
            return Ok(());
        }

        thread::Builder::new()
            .name("rdev-listener".to_string())
            .spawn(|| {
                info!("rdev listener thread started");

                if let Err(e) = listen(forward_rdev_event) {
                    error!(?e, "rdev listener failed - check input permissions");
                }

                RDEV_THREAD_SPAWNED.store(false, Ordering::SeqCst);
                info!("rdev listener thread stopped");
            })
            .map_err(|e| {
                RDEV_THREAD_SPAWNED.store(false, Ordering::SeqCst);
                sink_lock(&RDEV_SINK).take();
                KeyboardError::HookInstall(e.to_string())
            })?;

        Ok(())
    }

    fn uninstall(&self) {
        if sink_lock(&RDEV_SINK).take().is_some() {
            debug!("rdev sink detached");
        }
    }
}

/// rdev callback - must stay fast, it runs on the OS hook thread
fn forward_rdev_event(event: Event) {
    let raw = match event.event_type {
        EventType::KeyPress(key) => RawKeyEvent::Press(resolve(&key)),
        EventType::KeyRelease(key) => RawKeyEvent::Release(resolve(&key)),
        _ => return,
    };

    if let Some(sink) = sink_lock(&RDEV_SINK).as_ref() {
        let _ = sink.send(raw);
    }
}

/// Hook driven by code instead of hardware
#[derive(Debug, Default)]
pub struct SimulatedHook {
    sink: Mutex<Option<RawKeySender>>,
}

impl SimulatedHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a raw event. Returns false if no sink is attached, in which
    /// case the event is discarded.
    pub fn emit(&self, event: RawKeyEvent) -> bool {
        match sink_lock(&self.sink).as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    pub fn press(&self, key: impl Into<KeyId>) -> bool {
        self.emit(RawKeyEvent::Press(key.into()))
    }

    pub fn release(&self, key: impl Into<KeyId>) -> bool {
        self.emit(RawKeyEvent::Release(key.into()))
    }

    pub fn is_installed(&self) -> bool {
        sink_lock(&self.sink).is_some()
    }
}

impl KeyHook for SimulatedHook {
    fn install(&self, sink: RawKeySender) -> Result<(), KeyboardError> {
        *sink_lock(&self.sink) = Some(sink);
        Ok(())
    }

    fn uninstall(&self) {
        sink_lock(&self.sink).take();
    }
}
