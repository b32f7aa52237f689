//! telepresence-client: drive the robot from the keyboard
//!
//! - WASD (configurable) publish control commands on `/control`
//! - the two fisheye camera topics are composed side by side and displayed
//! - `q`, Ctrl-C or SIGTERM exit

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use telepresence_client::config::Config;
use telepresence_client::controls::RobotControls;
use telepresence_client::dispatch;
use telepresence_client::frames::{display_frames, Eye, LogSink, StereoFrames};
use telepresence_client::keyboard::{KeyId, KeyboardManager, RdevHook};
use telepresence_client::lifecycle::ShutdownSignal;
use telepresence_client::transport::{
    Node, TcpNode, CLIENT_TOPICS, LEFT_CAMERA_TOPIC, RIGHT_CAMERA_TOPIC,
};

/// How often the display checks for a new composite frame
const DISPLAY_PERIOD: Duration = Duration::from_millis(10);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "telepresence-client starting"
    );

    let config = Config::load().context("failed to load configuration")?;
    info!(
        server = %config.server_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        queue_capacity = config.queue_capacity,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    // Capture threads -> scheduler on this runtime
    let (dispatcher, scheduler) = dispatch::channel(config.queue_capacity);
    let (scheduler_done, scheduler_stop) = oneshot::channel::<()>();
    let scheduler = tokio::spawn(scheduler.run_until(async {
        let _ = scheduler_stop.await;
    }));

    let node = Arc::new(TcpNode::new(&config.server_url)?);
    let frames = Arc::new(StereoFrames::new());
    node.subscribe(LEFT_CAMERA_TOPIC, frames.handler(Eye::Left)).await?;
    node.subscribe(RIGHT_CAMERA_TOPIC, frames.handler(Eye::Right)).await?;
    node.connect(&CLIENT_TOPICS)
        .await
        .with_context(|| format!("failed to connect to {}", node.addr()))?;

    let manager = Arc::new(KeyboardManager::new(
        dispatcher,
        Arc::new(RdevHook::new()),
        config.keyboard(),
    ));
    let controls = RobotControls::new(config.control_keys.clone(), config.publish_held)
        .with_exit_key(KeyId::parse("q"));
    controls.install(&manager, Arc::clone(&node));
    let exit = controls.exit_signal();

    manager.start().context("failed to start keyboard capture")?;
    info!(keys = ?config.control_keys, "client initialized, press q to exit");

    let mut sink = LogSink::new();
    tokio::select! {
        shown = display_frames(&frames, &mut sink, DISPLAY_PERIOD) => {
            info!(shown, "display closed");
        }

        _ = exit.notified() => {
            info!("exit requested");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    let stopping = Arc::clone(&manager);
    if let Err(e) = tokio::task::spawn_blocking(move || stopping.stop()).await {
        error!(?e, "keyboard stop task failed");
    }
    drop(manager);

    let _ = scheduler_done.send(());
    match scheduler.await {
        Ok(stats) => info!(?stats, "scheduler finished"),
        Err(e) => error!(?e, "scheduler task failed"),
    }

    if let Err(e) = node.disconnect().await {
        warn!(?e, "disconnect failed");
    }

    info!(frames = sink.shown(), "telepresence-client stopped");
    Ok(())
}
