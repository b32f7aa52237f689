//! Keyboard capture and event dispatch
//!
//! A key hook feeds raw press/release notifications to the capture thread,
//! which tracks pressed keys and schedules KeyDown/KeyUp callbacks. A poll
//! thread schedules KeyHeld callbacks for every pressed key at a fixed rate.
//! Neither thread runs callback bodies; they only hand work to the
//! [`Dispatcher`](crate::dispatch::Dispatcher).

mod capture;
mod hook;
mod keys;
mod manager;
mod poll;
mod registry;
mod state;

pub use hook::{KeyHook, RawKeyEvent, RawKeySender, RdevHook, SimulatedHook};
pub use keys::{resolve, KeyId};
pub use manager::{KeyboardConfig, KeyboardManager};
pub use registry::{callback, Callback, CallbackFuture, CallbackRegistry};
pub use state::KeyState;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::trace;

use crate::dispatch::Dispatcher;
use crate::events::{EventKind, KeyEvent};

/// Errors raised by the keyboard subsystem
#[derive(Debug, thiserror::Error)]
pub enum KeyboardError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to install key hook: {0}")]
    HookInstall(String),

    #[error("failed to spawn {name} thread: {reason}")]
    ThreadSpawn { name: &'static str, reason: String },
}

/// State shared by the capture and poll threads of one manager
#[derive(Clone)]
struct Pipeline {
    state: Arc<KeyState>,
    registry: Arc<CallbackRegistry>,
    dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
}

impl Pipeline {
    fn new(dispatcher: Dispatcher) -> Self {
        Self {
            state: Arc::new(KeyState::new()),
            registry: Arc::new(CallbackRegistry::new()),
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Submit every callback registered for `(kind, key)`, in registration
    /// order. Returns how many were accepted.
    fn dispatch_matching(&self, kind: EventKind, key: &KeyId) -> usize {
        let callbacks = self.registry.lookup(kind, key);
        if callbacks.is_empty() {
            return 0;
        }

        trace!(%kind, %key, count = callbacks.len(), "dispatching callbacks");
        callbacks
            .into_iter()
            .filter(|cb| {
                self.dispatcher
                    .submit(KeyEvent::new(kind, key.clone()), Arc::clone(cb))
            })
            .count()
    }
}
