//! Encoding sinks.
//!
//! Sinks consume composed frames in timeline order.

/// `ffmpeg`-based MP4 sink.
pub mod ffmpeg;
/// Frame sink trait and the in-memory sink.
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkOpts};
pub use sink::{AudioInput, FrameSink, InMemorySink, SinkConfig};
