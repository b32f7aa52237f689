//! Keyboard event types
//!
//! Provides the three event kinds the dispatch subsystem emits and the
//! `KeyEvent` label attached to every scheduled callback.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::keyboard::{KeyId, KeyboardError};

/// Kind of keyboard event a callback can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Fired once on the down-edge of a key press
    KeyDown,

    /// Fired once on the up-edge of a key release
    KeyUp,

    /// Fired once per poll tick for every key currently down
    #[serde(alias = "key_pressed")]
    KeyHeld,
}

impl EventKind {
    /// Textual name used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::KeyDown => "key_down",
            EventKind::KeyUp => "key_up",
            EventKind::KeyHeld => "key_held",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "key_down" => Ok(EventKind::KeyDown),
            "key_up" => Ok(EventKind::KeyUp),
            // "key_pressed" is the historical name for the held event
            "key_held" | "key_pressed" => Ok(EventKind::KeyHeld),
            other => Err(KeyboardError::InvalidArgument(format!(
                "unknown event type: {other}"
            ))),
        }
    }
}

/// A keyboard event as scheduled on the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: EventKind,
    pub key: KeyId,
}

impl KeyEvent {
    pub fn new(kind: EventKind, key: KeyId) -> Self {
        Self { kind, key }
    }
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.key)
    }
}
