//! PCM layout of the decoded audio stream.
//!
//! Decoders resample everything to one interleaved format; the audio
//! presenter derives its position and chunk durations from byte counts
//! through this type.

use std::time::Duration;

/// Sample encoding of interleaved PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian
    I16,
    /// 32-bit float little-endian
    F32,
}

impl SampleFormat {
    pub const fn bytes(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Stereo, signed 16-bit, 44.1 kHz.
    pub const STEREO_S16_44K: AudioFormat = AudioFormat::new(44_100, 2, SampleFormat::I16);

    pub const fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Bytes in one interleaved frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.sample_format.bytes()
    }

    pub fn bytes_per_second(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// Playback time covered by `bytes` of PCM.
    pub fn bytes_to_seconds(&self, bytes: u64) -> f64 {
        let rate = self.bytes_per_second();
        if rate == 0 {
            return 0.0;
        }
        bytes as f64 / rate as f64
    }

    pub fn duration_of(&self, bytes: usize) -> Duration {
        Duration::from_secs_f64(self.bytes_to_seconds(bytes as u64))
    }

    /// Whole-frame byte count covering `seconds` of audio.
    pub fn bytes_for(&self, seconds: f64) -> usize {
        if !(seconds.is_finite() && seconds > 0.0) {
            return 0;
        }
        let frames = (seconds * self.sample_rate as f64).round() as usize;
        frames * self.frame_bytes()
    }

    /// Round `bytes` down to a whole number of frames (at least one frame).
    pub fn align(&self, bytes: usize) -> usize {
        let frame = self.frame_bytes().max(1);
        (bytes - bytes % frame).max(frame)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::STEREO_S16_44K
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_s16_rates() {
        let format = AudioFormat::default();
        assert_eq!(format.frame_bytes(), 4);
        assert_eq!(format.bytes_per_second(), 176_400);
    }

    #[test]
    fn test_chunk_duration() {
        let format = AudioFormat::default();
        // 2048 bytes = 512 frames at 44.1 kHz
        let duration = format.duration_of(2048);
        assert!((duration.as_secs_f64() - 512.0 / 44_100.0).abs() < 1e-9);
        assert!((format.bytes_to_seconds(176_400) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bytes_for() {
        let format = AudioFormat::default();
        assert_eq!(format.bytes_for(5.0), 882_000);
        assert_eq!(format.bytes_for(-1.0), 0);
        let float = AudioFormat::new(48_000, 1, SampleFormat::F32);
        assert_eq!(float.bytes_for(0.5), 96_000);
    }

    #[test]
    fn test_align() {
        let format = AudioFormat::default();
        assert_eq!(format.align(2048), 2048);
        assert_eq!(format.align(2050), 2048);
        assert_eq!(format.align(1), 4);
    }
}
