//! Callback registration
//!
//! Maps `(EventKind, KeyId)` to the ordered list of callbacks for it.
//! Lookups hand out a copy of the list so registration may keep going while
//! the capture and poll threads read.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::keys::KeyId;
use super::KeyboardError;
use crate::events::EventKind;

/// Future returned by a callback invocation
pub type CallbackFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// An asynchronous, zero-argument unit of work run on the scheduler
pub type Callback = Arc<dyn Fn() -> CallbackFuture + Send + Sync + 'static>;

/// Wrap an async closure as a `Callback`
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || -> CallbackFuture { Box::pin(f()) })
}

/// Ordered callbacks per event kind and key
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<(EventKind, KeyId), Vec<Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the list for `(kind, key)`. Duplicates are kept
    /// and all of them fire.
    pub fn register(&self, kind: EventKind, key: KeyId, callback: Callback) {
        debug!(%kind, %key, "callback registered");
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((kind, key))
            .or_default()
            .push(callback);
    }

    /// Register using textual kind and key names, as they appear in
    /// configuration. Unknown kinds fail with `InvalidArgument`.
    pub fn register_named(
        &self,
        kind: &str,
        key: &str,
        callback: Callback,
    ) -> Result<(), KeyboardError> {
        let kind: EventKind = kind.parse()?;
        self.register(kind, KeyId::parse(key), callback);
        Ok(())
    }

    /// Callbacks for `(kind, key)` in registration order; empty if none
    pub fn lookup(&self, kind: EventKind, key: &KeyId) -> Vec<Callback> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}
