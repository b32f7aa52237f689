//! Frame display loop

use std::time::Duration;

use image::GrayImage;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::stereo::StereoFrames;

/// Somewhere to show composite frames
pub trait FrameSink {
    fn show(&mut self, frame: &GrayImage);

    /// Polled every display tick; true ends the display loop
    fn exit_requested(&mut self) -> bool {
        false
    }
}

/// Headless sink: logs frame geometry
#[derive(Debug, Default)]
pub struct LogSink {
    shown: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl FrameSink for LogSink {
    fn show(&mut self, frame: &GrayImage) {
        self.shown += 1;
        debug!(width = frame.width(), height = frame.height(), "frame");
        if self.shown % 100 == 0 {
            info!(frames = self.shown, "frames displayed");
        }
    }
}

/// Show each new composite on `sink`, checking every `period`, until the
/// sink asks to exit. Returns the number of frames shown.
pub async fn display_frames<S>(frames: &StereoFrames, sink: &mut S, period: Duration) -> u64
where
    S: FrameSink + ?Sized,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_generation = 0;
    let mut shown = 0;

    loop {
        ticker.tick().await;

        if sink.exit_requested() {
            debug!(shown, "display exit requested");
            return shown;
        }

        if frames.generation() == last_generation {
            continue;
        }
        if let Some((generation, frame)) = frames.combined() {
            sink.show(&frame);
            last_generation = generation;
            shown += 1;
        }
    }
}
