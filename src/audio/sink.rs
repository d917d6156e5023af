//! Audio output device abstraction.

use std::thread;
use std::time::Duration;

/// Error type for audio output
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("No audio output device available")]
    NoDevice,
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("Audio sink closed")]
    Closed,
}

/// Blocking PCM sink fed by the audio presentation stage.
///
/// `write` may hold the caller for up to `deadline` while the device takes
/// the data; the stage varies that deadline to speed up or slow down its
/// own consumption of the ring buffer.
pub trait AudioSink: Send {
    /// Emit interleaved PCM, returning the number of bytes accepted.
    fn write(&mut self, pcm: &[u8], deadline: Duration) -> Result<usize, SinkError>;
}

/// Sink that discards audio.
///
/// A paced sink holds each write for its full deadline, standing in for a
/// device that consumes audio in real time.
#[derive(Debug, Clone)]
pub struct NullSink {
    paced: bool,
    bytes_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            paced: true,
            bytes_written: 0,
        }
    }

    /// Sink that returns immediately from every write.
    pub fn unpaced() -> Self {
        Self {
            paced: false,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for NullSink {
    fn write(&mut self, pcm: &[u8], deadline: Duration) -> Result<usize, SinkError> {
        if self.paced && !deadline.is_zero() {
            thread::sleep(deadline);
        }
        self.bytes_written += pcm.len() as u64;
        Ok(pcm.len())
    }
}
