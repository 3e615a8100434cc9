//! Event plumbing
//!
//! Provides the publish/subscribe capability and a transcript recorder.

mod emitter;
mod transcript;

pub use emitter::{handler, EventEmitter, EventSource, Handler};
pub use transcript::Transcript;
