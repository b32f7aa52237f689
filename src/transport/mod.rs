//! Publish/subscribe transport
//!
//! The client only needs four operations from the network: connect,
//! disconnect, subscribe and publish. `TcpNode` talks to a relay over TCP;
//! `LocalBus` delivers in-process.

mod client;
mod local;
mod protocol;

pub use client::TcpNode;
pub use local::LocalBus;
pub use protocol::{read_envelope, write_envelope, Envelope, MAX_MESSAGE_LEN};

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

/// Robot control commands
pub const CONTROL_TOPIC: &str = "/control";
/// Left fisheye camera
pub const LEFT_CAMERA_TOPIC: &str = "/vision-channel-1";
/// Right fisheye camera
pub const RIGHT_CAMERA_TOPIC: &str = "/vision-channel-2";
/// Telemetry
pub const DATA_TOPIC: &str = "/data";

/// Topics the control client joins on connect
pub const CLIENT_TOPICS: [&str; 4] = [
    CONTROL_TOPIC,
    LEFT_CAMERA_TOPIC,
    RIGHT_CAMERA_TOPIC,
    DATA_TOPIC,
];

/// Handler invoked with `(topic, payload)` for every message on a
/// subscribed topic
pub type MessageHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Errors raised by transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("message too large: {0} bytes")]
    TooLarge(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A publish/subscribe network client
pub trait Node: Send + Sync + 'static {
    /// Connect and join `topics`
    fn connect(&self, topics: &[&str]) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Add `handler` for `topic`. Handlers for one topic run in the order
    /// they were added.
    fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: Value,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
