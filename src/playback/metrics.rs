//! Per-session synchronization counters.
//!
//! Stages record every correction decision here; the engine logs a
//! snapshot when a session ends.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::playback::sync::{Cadence, VideoCorrection};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    frames_presented: AtomicU64,
    frames_waited: AtomicU64,
    frames_dropped: AtomicU64,
    chunks_nominal: AtomicU64,
    chunks_half: AtomicU64,
    chunks_double: AtomicU64,
    audio_resyncs: AtomicU64,
    audio_bytes: AtomicU64,
    decode_errors: AtomicU64,
    // f64 bits of the most recent delay per stream
    last_video_delay: AtomicU64,
    last_audio_delay: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the decision taken for a video frame.
    pub fn record_video(&self, correction: VideoCorrection, delay: f64) {
        let counter = match correction {
            VideoCorrection::Present => None,
            VideoCorrection::Wait(_) => Some(&self.frames_waited),
            VideoCorrection::Drop => Some(&self.frames_dropped),
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        self.last_video_delay.store(delay.to_bits(), Ordering::Relaxed);
    }

    pub fn record_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an audio chunk written with `cadence`.
    pub fn record_audio(&self, cadence: Cadence, delay: f64, bytes: usize) {
        let counter = match cadence {
            Cadence::Half => &self.chunks_half,
            Cadence::Nominal => &self.chunks_nominal,
            Cadence::Double => &self.chunks_double,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.audio_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_audio_delay.store(delay.to_bits(), Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.audio_resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out the counters. `ring_dropped_bytes` comes from the ring buffer.
    pub fn snapshot(&self, ring_dropped_bytes: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
            frames_waited: self.frames_waited.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_nominal: self.chunks_nominal.load(Ordering::Relaxed),
            chunks_half: self.chunks_half.load(Ordering::Relaxed),
            chunks_double: self.chunks_double.load(Ordering::Relaxed),
            audio_resyncs: self.audio_resyncs.load(Ordering::Relaxed),
            audio_bytes: self.audio_bytes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            ring_dropped_bytes,
            last_video_delay: f64::from_bits(self.last_video_delay.load(Ordering::Relaxed)),
            last_audio_delay: f64::from_bits(self.last_audio_delay.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub frames_presented: u64,
    pub frames_waited: u64,
    pub frames_dropped: u64,
    pub chunks_nominal: u64,
    pub chunks_half: u64,
    pub chunks_double: u64,
    pub audio_resyncs: u64,
    pub audio_bytes: u64,
    pub decode_errors: u64,
    pub ring_dropped_bytes: u64,
    pub last_video_delay: f64,
    pub last_audio_delay: f64,
}

impl MetricsSnapshot {
    pub fn audio_chunks(&self) -> u64 {
        self.chunks_nominal + self.chunks_half + self.chunks_double
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "video: {} presented ({} waited), {} dropped; audio: {} chunks ({} half, {} double), {} resyncs, {} bytes, {} dropped bytes; {} decode errors",
            self.frames_presented,
            self.frames_waited,
            self.frames_dropped,
            self.audio_chunks(),
            self.chunks_half,
            self.chunks_double,
            self.audio_resyncs,
            self.audio_bytes,
            self.ring_dropped_bytes,
            self.decode_errors,
        )
    }
}
