//! m3d channel - command sinks for scene resource synchronization
//!
//! A scene serializes its objects into one or more channels. Each channel
//! owns its handle space and sees commands in the order they were issued.
//!
//! Provided sinks:
//! - `RecordingChannel`: logs commands (fake channel for tests)
//! - `RenderChannel`: batches commands to a render thread mirror

pub mod channel;
pub mod mirror;
pub mod recording;
pub mod render_channel;
pub mod types;

pub use channel::*;
pub use mirror::{MirrorEntry, MirrorError, ResourceMirror};
pub use recording::*;
pub use render_channel::*;
pub use types::*;

pub fn version() -> &'static str {
    "0.1.0"
}
