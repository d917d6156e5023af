//! Decoder interfaces and decoded video frames.
//!
//! Video decoders produce RGBA frames stamped with a presentation time in
//! seconds. Audio decoders produce interleaved PCM already converted to
//! the pipeline's [`AudioFormat`](crate::audio::AudioFormat).

use crate::core::packet::Packet;
use crate::core::queue::UnitQueue;

/// Error type for decoding
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Malformed packet: {0}")]
    Malformed(String),
    #[error("Unsupported stream: {0}")]
    Unsupported(String),
}

/// Decoded picture in tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation time in seconds
    pub pts: f64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, pts: f64) -> Self {
        Self {
            data,
            width,
            height,
            pts,
        }
    }

    /// Byte length an RGBA frame of this size must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Queue of decoded frames between the video decoder and presenter.
pub type FrameQueue = UnitQueue<VideoFrame>;

/// Turns coded video packets into frames.
///
/// A packet may yield zero frames (the codec is buffering) or several.
pub trait VideoDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>, DecodeError>;

    /// Drain frames the codec still holds at end of stream.
    fn flush(&mut self) -> Result<Vec<VideoFrame>, DecodeError> {
        Ok(Vec::new())
    }
}

/// Turns coded audio packets into interleaved PCM bytes.
pub trait AudioDecoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<u8>, DecodeError>;

    fn flush(&mut self) -> Result<Vec<u8>, DecodeError> {
        Ok(Vec::new())
    }
}
