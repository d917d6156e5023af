pub mod decoder;
pub mod stage;

pub use decoder::{AudioDecoder, DecodeError, FrameQueue, VideoDecoder, VideoFrame};
