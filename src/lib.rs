//! telepresence-client: keyboard-driven control client for a telepresence robot
//!
//! Key presses are captured system-wide on a dedicated thread, tracked in a
//! pressed-key set and turned into asynchronous callbacks:
//! - KeyDown / KeyUp once per transition
//! - KeyHeld on every poll tick while a key stays down
//!
//! Callbacks are handed to a single scheduler on the application runtime,
//! which is also where the network node and the frame display run.

pub mod config;
pub mod controls;
pub mod dispatch;
pub mod events;
pub mod frames;
pub mod keyboard;
pub mod lifecycle;
pub mod transport;
