//! control-monitor: print every message published on `/control`
//!
//! Stands in for the robot side while testing the client.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use telepresence_client::config::Config;
use telepresence_client::controls::ControlCommand;
use telepresence_client::lifecycle::ShutdownSignal;
use telepresence_client::transport::{Node, TcpNode, CONTROL_TOPIC};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().context("failed to load configuration")?;
    let node = TcpNode::new(&config.server_url)?;

    node.subscribe(
        CONTROL_TOPIC,
        Arc::new(|topic: &str, payload: &Value| {
            match serde_json::from_value::<ControlCommand>(payload.clone()) {
                Ok(command) => {
                    info!(topic, key = %command.command, status = ?command.status, "control")
                }
                Err(_) => warn!(topic, %payload, "unrecognised control message"),
            }
        }),
    )
    .await?;
    node.connect(&[CONTROL_TOPIC])
        .await
        .with_context(|| format!("failed to connect to {}", node.addr()))?;

    info!(server = node.addr(), topic = CONTROL_TOPIC, "monitoring");

    ShutdownSignal::new().wait().await;

    info!("shutting down...");
    if let Err(e) = node.disconnect().await {
        warn!(?e, "disconnect failed");
    }
    Ok(())
}
