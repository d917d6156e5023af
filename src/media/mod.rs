//! Packet sources: the demuxer interface, a generated test stream, and
//! (with the `ffmpeg` feature) real containers.

pub mod source;
pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use source::{MediaSource, SourceError};
pub use synthetic::SyntheticStream;
