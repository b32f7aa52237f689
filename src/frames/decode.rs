//! Frame payload decoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::GrayImage;
use serde::Deserialize;
use serde_json::Value;

/// Errors raised while decoding a frame payload
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("frame image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    image: String,
}

/// Decode a camera payload into an 8-bit grayscale raster.
///
/// Accepts the payload object itself or a JSON string containing it, as some
/// publishers double-encode.
pub fn decode_frame(payload: &Value) -> Result<GrayImage, FrameError> {
    let frame: FramePayload = match payload {
        Value::String(text) => serde_json::from_str(text)?,
        other => FramePayload::deserialize(other)?,
    };

    let bytes = STANDARD.decode(frame.image.trim())?;
    let decoded = image::load_from_memory(&bytes)?;

    Ok(decoded.to_luma8())
}
