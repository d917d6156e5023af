//! Threaded audio/video playback pipeline.
//!
//! A demuxer thread splits packets into per-stream queues, one decoder thread
//! per stream turns them into RGBA frames or PCM, and one presentation thread
//! per stream emits them in step with a shared [`MasterClock`]. The
//! [`PlaybackEngine`] drives sessions of that pipeline: play, pause, seek,
//! speed, and stop.
//!
//! [`MasterClock`]: playback::MasterClock
//! [`PlaybackEngine`]: playback::PlaybackEngine

pub mod audio;
pub mod config;
pub mod core;
pub mod decode;
pub mod media;
pub mod playback;
pub mod render;
