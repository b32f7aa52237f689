//! Robot control bindings
//!
//! Maps driving keys to `/control` messages:
//! `{"command": "w", "status": "down"}` on press and `"release"` on release,
//! optionally `"held"` on every poll tick. A separate exit key wakes whoever
//! waits on [`RobotControls::exit_signal`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::events::EventKind;
use crate::keyboard::{callback, Callback, KeyId, KeyboardManager};
use crate::transport::{Node, CONTROL_TOPIC};

/// Key transition reported to the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Down,
    Release,
    Held,
}

impl ControlStatus {
    fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::KeyDown => Self::Down,
            EventKind::KeyUp => Self::Release,
            EventKind::KeyHeld => Self::Held,
        }
    }
}

/// Payload published on the control topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: KeyId,
    pub status: ControlStatus,
}

/// Control key bindings for one session
pub struct RobotControls {
    keys: Vec<KeyId>,
    publish_held: bool,
    exit_key: Option<KeyId>,
    exit: Arc<Notify>,
}

impl RobotControls {
    pub fn new(keys: Vec<KeyId>, publish_held: bool) -> Self {
        Self {
            keys,
            publish_held,
            exit_key: None,
            exit: Arc::new(Notify::new()),
        }
    }

    /// Notify the exit signal when `key` goes down
    pub fn with_exit_key(mut self, key: KeyId) -> Self {
        self.exit_key = Some(key);
        self
    }

    /// Notified once per press of the exit key
    pub fn exit_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.exit)
    }

    /// Register every binding on `manager`, publishing through `node`.
    /// Returns the number of callbacks registered.
    pub fn install<N: Node>(&self, manager: &KeyboardManager, node: Arc<N>) -> usize {
        let mut kinds = vec![EventKind::KeyDown, EventKind::KeyUp];
        if self.publish_held {
            kinds.push(EventKind::KeyHeld);
        }

        let mut registered = 0;
        for key in &self.keys {
            for &kind in &kinds {
                let publish = publisher(Arc::clone(&node), key.clone(), kind);
                manager.register(kind, key.clone(), publish);
                registered += 1;
            }
        }

        if let Some(key) = &self.exit_key {
            let exit = Arc::clone(&self.exit);
            let exit_key = key.clone();
            manager.register(
                EventKind::KeyDown,
                key.clone(),
                callback(move || {
                    let exit = Arc::clone(&exit);
                    let exit_key = exit_key.clone();
                    async move {
                        info!(key = %exit_key, "exit key pressed");
                        exit.notify_one();
                        Ok(())
                    }
                }),
            );
            registered += 1;
        }

        debug!(keys = self.keys.len(), registered, "control bindings installed");
        registered
    }
}

fn publisher<N: Node>(node: Arc<N>, key: KeyId, kind: EventKind) -> Callback {
    let status = ControlStatus::for_kind(kind);
    callback(move || {
        let node = Arc::clone(&node);
        let command = ControlCommand {
            command: key.clone(),
            status,
        };
        async move {
            match status {
                ControlStatus::Held => debug!(key = %command.command, "control held"),
                _ => info!(key = %command.command, ?status, "control"),
            }
            let payload = serde_json::to_value(&command)?;
            node.publish(CONTROL_TOPIC, payload).await?;
            Ok::<(), anyhow::Error>(())
        }
    })
}
