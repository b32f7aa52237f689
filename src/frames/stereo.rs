//! Latest left/right frames and their side-by-side composite

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{imageops, GrayImage};
use serde_json::Value;
use tracing::{debug, warn};

use super::decode::decode_frame;
use crate::transport::MessageHandler;

/// Which camera a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eye::Left => write!(f, "left"),
            Eye::Right => write!(f, "right"),
        }
    }
}

#[derive(Default)]
struct Inner {
    left: Option<GrayImage>,
    right: Option<GrayImage>,
    combined: Option<GrayImage>,
    /// Bumped every time `combined` changes
    generation: u64,
}

/// Stereo frame store shared between the subscription handlers and the
/// display loop
#[derive(Default)]
pub struct StereoFrames {
    inner: Mutex<Inner>,
}

impl StereoFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `payload` as the latest frame for `eye` and recompose. A
    /// payload that fails to decode leaves every frame unchanged. Returns
    /// true if the composite changed.
    pub fn update(&self, eye: Eye, payload: &Value) -> bool {
        let frame = match decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%eye, error = %e, "dropping undecodable frame");
                return false;
            }
        };

        self.set(eye, frame)
    }

    /// Store an already decoded frame for `eye` and recompose
    pub fn set(&self, eye: Eye, frame: GrayImage) -> bool {
        let mut inner = self.lock();
        match eye {
            Eye::Left => inner.left = Some(frame),
            Eye::Right => inner.right = Some(frame),
        }

        let combined = match (&inner.left, &inner.right) {
            (Some(left), Some(right)) => match hstack(left, right) {
                Some(combined) => combined,
                None => {
                    warn!(
                        left_height = left.height(),
                        right_height = right.height(),
                        "camera heights differ, keeping previous composite"
                    );
                    return false;
                }
            },
            _ => return false,
        };

        inner.combined = Some(combined);
        inner.generation += 1;
        true
    }

    /// Latest composite with its generation, if both cameras have reported
    pub fn combined(&self) -> Option<(u64, GrayImage)> {
        let inner = self.lock();
        inner
            .combined
            .as_ref()
            .map(|img| (inner.generation, img.clone()))
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Subscription handler feeding `eye`
    pub fn handler(self: &Arc<Self>, eye: Eye) -> MessageHandler {
        let frames = Arc::clone(self);
        Arc::new(move |topic: &str, payload: &Value| {
            if frames.update(eye, payload) {
                debug!(%eye, topic, "composite frame updated");
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Place `left` and `right` side by side. Heights must match.
fn hstack(left: &GrayImage, right: &GrayImage) -> Option<GrayImage> {
    if left.height() != right.height() {
        return None;
    }

    let mut out = GrayImage::new(left.width() + right.width(), left.height());
    imageops::replace(&mut out, left, 0, 0);
    imageops::replace(&mut out, right, i64::from(left.width()), 0);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::super::decode::tests::payload;
    use super::*;
    use image::Luma;
    use serde_json::json;

    #[test]
    fn test_needs_both_eyes() {
        let frames = StereoFrames::new();
        assert!(!frames.update(Eye::Left, &payload(4, 2, 10)));
        assert!(frames.combined().is_none());

        assert!(frames.update(Eye::Right, &payload(3, 2, 250)));
        let (generation, img) = frames.combined().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(img.dimensions(), (7, 2));
        assert_eq!(img.get_pixel(0, 0), &Luma([10]));
        assert_eq!(img.get_pixel(6, 1), &Luma([250]));
    }

    #[test]
    fn test_bad_frame_keeps_previous() {
        let frames = StereoFrames::new();
        frames.update(Eye::Left, &payload(2, 2, 1));
        frames.update(Eye::Right, &payload(2, 2, 2));

        assert!(!frames.update(Eye::Right, &json!({"image": "%%%"})));
        let (generation, img) = frames.combined().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(img.get_pixel(3, 0), &Luma([2]));
    }

    #[test]
    fn test_height_mismatch_keeps_previous() {
        let frames = StereoFrames::new();
        frames.update(Eye::Left, &payload(2, 2, 1));
        frames.update(Eye::Right, &payload(2, 2, 2));

        assert!(!frames.update(Eye::Right, &payload(2, 5, 3)));
        assert_eq!(frames.generation(), 1);
        assert_eq!(frames.combined().unwrap().1.dimensions(), (4, 2));
    }

    #[test]
    fn test_handler_updates_frames() {
        let frames = Arc::new(StereoFrames::new());
        let left = frames.handler(Eye::Left);
        let right = frames.handler(Eye::Right);

        left("/vision-channel-1", &payload(1, 1, 0));
        right("/vision-channel-2", &payload(1, 1, 0));

        assert_eq!(frames.generation(), 1);
    }
}
