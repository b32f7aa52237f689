//! Held-key poll thread
//!
//! Level-triggered: every tick schedules KeyHeld callbacks for every key in
//! the pressed set. Ticks follow fixed deadlines so the rate does not drift
//! with the time spent dispatching.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use super::{KeyboardError, Pipeline};
use crate::events::EventKind;

pub(super) fn spawn(
    pipeline: Pipeline,
    interval: Duration,
    stop_rx: Receiver<()>,
) -> Result<JoinHandle<()>, KeyboardError> {
    thread::Builder::new()
        .name("key-poll".to_string())
        .spawn(move || run_poll_loop(&pipeline, interval, stop_rx))
        .map_err(|e| KeyboardError::ThreadSpawn {
            name: "key-poll",
            reason: e.to_string(),
        })
}

fn run_poll_loop(pipeline: &Pipeline, interval: Duration, stop_rx: Receiver<()>) {
    info!(interval_ms = interval.as_millis() as u64, "poll thread started");

    let mut deadline = Instant::now() + interval;
    loop {
        // The stop channel doubles as the sleep so stop() wakes us at once
        let wait = deadline.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if !pipeline.running.load(Ordering::SeqCst) {
            break;
        }

        poll_once(pipeline);

        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            debug!(
                behind_ms = (now - deadline).as_millis() as u64,
                "poll thread fell behind, resynchronising"
            );
            deadline = now + interval;
        }
    }

    info!("poll thread stopped");
}

/// One tick. Returns the number of callbacks scheduled.
pub(super) fn poll_once(pipeline: &Pipeline) -> usize {
    let pressed = pipeline.state.snapshot();
    if !pressed.is_empty() {
        trace!(keys = pressed.len(), "poll tick");
    }

    pressed
        .iter()
        .map(|key| pipeline.dispatch_matching(EventKind::KeyHeld, key))
        .sum()
}
