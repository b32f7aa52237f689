//! In-process transport
//!
//! Delivers published messages straight to subscribed handlers on the
//! publishing task. Used for tests and headless runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, trace};

use super::{MessageHandler, Node, TransportError};

/// Loopback publish/subscribe bus
#[derive(Default)]
pub struct LocalBus {
    handlers: RwLock<HashMap<String, Vec<MessageHandler>>>,
    connected: AtomicBool,
    published: AtomicU64,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Messages published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    fn deliver(&self, topic: &str, payload: &Value) -> usize {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(topic, payload);
        }
        handlers.len()
    }
}

impl Node for LocalBus {
    async fn connect(&self, topics: &[&str]) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        debug!(?topics, "local bus connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("local bus disconnected");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.published.fetch_add(1, Ordering::SeqCst);
        let delivered = self.deliver(topic, &payload);
        trace!(topic, delivered, "local publish");
        Ok(())
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("connected", &self.is_connected())
            .field("published", &self.published())
            .finish()
    }
}
