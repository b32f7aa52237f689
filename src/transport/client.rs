//! TCP relay client
//!
//! Keeps one connection to the relay. Writes go through a mutex-guarded
//! write half; a reader task dispatches incoming messages to subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::protocol::{read_envelope, write_envelope, Envelope};
use super::{MessageHandler, Node, TransportError};

type Handlers = Arc<RwLock<HashMap<String, Vec<MessageHandler>>>>;

/// Publish/subscribe client for a TCP relay
pub struct TcpNode {
    addr: String,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    handlers: Handlers,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TcpNode {
    /// Create a client for `server_url` (`host:port`, optionally with a
    /// scheme such as `http://`). Does not connect.
    pub fn new(server_url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            addr: parse_server_url(server_url)?,
            writer: tokio::sync::Mutex::new(None),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            reader: Mutex::new(None),
        })
    }

    /// Address this client connects to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Node for TcpNode {
    async fn connect(&self, topics: &[&str]) -> Result<(), TransportError> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();

        let hello = Envelope::Hello {
            topics: topics.iter().map(|t| t.to_string()).collect(),
        };
        write_envelope(&mut write_half, &hello).await?;

        // Subscriptions made before connecting
        for topic in self.subscribed_topics() {
            write_envelope(&mut write_half, &Envelope::Subscribe { topic }).await?;
        }

        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&self.handlers)));
        let previous = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(reader);
        if let Some(previous) = previous {
            previous.abort();
        }

        *self.writer.lock().await = Some(write_half);

        info!(addr = %self.addr, ?topics, "connected to relay");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = write_envelope(&mut writer, &Envelope::Bye).await {
                debug!(?e, "failed to send bye");
            }
            let _ = writer.shutdown().await;
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }

        info!(addr = %self.addr, "disconnected from relay");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        let first = {
            let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
            let list = handlers.entry(topic.to_string()).or_default();
            list.push(handler);
            list.len() == 1
        };

        if first {
            let mut writer = self.writer.lock().await;
            if let Some(writer) = writer.as_mut() {
                write_envelope(
                    writer,
                    &Envelope::Subscribe {
                        topic: topic.to_string(),
                    },
                )
                .await?;
            }
        }

        debug!(topic, "subscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;

        write_envelope(
            writer,
            &Envelope::Publish {
                topic: topic.to_string(),
                payload,
            },
        )
        .await?;

        trace!(topic, "published");
        Ok(())
    }
}

impl Drop for TcpNode {
    fn drop(&mut self) {
        if let Some(reader) = self
            .reader
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            reader.abort();
        }
    }
}

/// Receive messages until the relay closes the connection
async fn read_loop(mut reader: OwnedReadHalf, handlers: Handlers) {
    loop {
        match read_envelope(&mut reader).await {
            Ok(Some(Envelope::Message { topic, payload })) => {
                let matching = handlers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&topic)
                    .cloned()
                    .unwrap_or_default();

                trace!(%topic, handlers = matching.len(), "message received");
                for handler in &matching {
                    handler(&topic, &payload);
                }
            }
            Ok(Some(other)) => {
                debug!(?other, "ignoring unexpected envelope from relay");
            }
            Ok(None) => {
                info!("relay closed the connection");
                break;
            }
            Err(e) => {
                warn!(?e, "relay read error, dropping connection");
                break;
            }
        }
    }
}

/// `http://host:port/path` -> `host:port`
fn parse_server_url(url: &str) -> Result<String, TransportError> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or_default().trim();

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(authority.to_string())
        }
        _ => Err(TransportError::InvalidAddress(url.to_string())),
    }
}
