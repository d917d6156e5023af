//! Audio path: PCM format, the sample ring buffer, output sinks, and the
//! audio presentation stage.

pub mod format;
pub mod output;
pub mod ring_buffer;
pub mod sink;

#[cfg(feature = "cpal")]
pub mod cpal_sink;

pub use format::{AudioFormat, SampleFormat};
pub use ring_buffer::SampleRingBuffer;
pub use sink::{AudioSink, NullSink, SinkError};

#[cfg(feature = "cpal")]
pub use cpal_sink::CpalSink;
