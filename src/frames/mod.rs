//! Camera frames: decoding, stereo composition and display
//!
//! Frames arrive as `{"image": "<base64 jpeg>"}` on the two camera topics.
//! A frame that fails to decode is logged and the previous one kept.

mod decode;
mod display;
mod stereo;

pub use decode::{decode_frame, FrameError};
pub use display::{display_frames, FrameSink, LogSink};
pub use stereo::{Eye, StereoFrames};
