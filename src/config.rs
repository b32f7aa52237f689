//! Configuration loading and management

use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::dispatch::DEFAULT_QUEUE_CAPACITY;
use crate::keyboard::{KeyId, KeyboardConfig};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:7000";
const DEFAULT_CONTROL_KEYS: &str = "w,a,s,d";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Relay server the node connects to
    pub server_url: String,

    /// Interval between KeyHeld ticks
    pub poll_interval: Duration,

    /// Upper bound on each thread join at shutdown
    pub join_timeout: Duration,

    /// Callbacks the dispatcher queues before dropping
    pub queue_capacity: usize,

    /// Keys published on the control topic
    pub control_keys: Vec<KeyId>,

    /// Also publish a "held" status on every poll tick
    pub publish_held: bool,
}

impl Default for Config {
    fn default() -> Self {
        let keyboard = KeyboardConfig::default();
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: keyboard.poll_interval,
            join_timeout: keyboard.join_timeout,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            control_keys: parse_keys(DEFAULT_CONTROL_KEYS),
            publish_held: false,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("TELEPRESENCE_SERVER_URL") {
            config.server_url = url.trim().to_string();
        }

        if let Some(ms) = number(&lookup, "TELEPRESENCE_POLL_INTERVAL_MS")? {
            if ms == 0 {
                bail!("TELEPRESENCE_POLL_INTERVAL_MS must be greater than zero");
            }
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = number(&lookup, "TELEPRESENCE_JOIN_TIMEOUT_MS")? {
            config.join_timeout = Duration::from_millis(ms);
        }

        if let Some(capacity) = number(&lookup, "TELEPRESENCE_QUEUE_CAPACITY")? {
            if capacity == 0 {
                bail!("TELEPRESENCE_QUEUE_CAPACITY must be greater than zero");
            }
            config.queue_capacity = usize::try_from(capacity)
                .context("TELEPRESENCE_QUEUE_CAPACITY is too large")?;
        }

        if let Some(keys) = lookup("TELEPRESENCE_CONTROL_KEYS") {
            config.control_keys = parse_keys(&keys);
        }

        if let Some(flag) = lookup("TELEPRESENCE_PUBLISH_HELD") {
            config.publish_held = parse_flag(&flag)
                .with_context(|| format!("TELEPRESENCE_PUBLISH_HELD: invalid value {flag:?}"))?;
        }

        Ok(config)
    }

    /// Timing for the keyboard manager
    pub fn keyboard(&self) -> KeyboardConfig {
        KeyboardConfig {
            poll_interval: self.poll_interval,
            join_timeout: self.join_timeout,
        }
    }
}

fn number<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{name}: invalid number {value:?}"))
        })
        .transpose()
}

fn parse_keys(list: &str) -> Vec<KeyId> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(KeyId::parse)
        .collect()
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
