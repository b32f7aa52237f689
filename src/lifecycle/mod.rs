//! Process lifecycle: shutdown signals and bounded thread joins

mod join;
mod shutdown;

pub use join::join_with_timeout;
pub use shutdown::ShutdownSignal;
