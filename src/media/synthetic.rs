//! Generated test stream: colour-cycling video and a sine tone.
//!
//! Runs the whole pipeline without a container library. The "coded" packets
//! are tiny descriptors that the matching decoders expand into RGBA frames
//! and PCM, so decode cost stays real (full-size frames, per-sample math).

use std::f64::consts::TAU;

use crate::audio::format::{AudioFormat, SampleFormat};
use crate::core::packet::{MediaKind, Packet};
use crate::core::time::TimeBase;
use crate::decode::decoder::{AudioDecoder, DecodeError, VideoDecoder, VideoFrame};
use crate::media::source::{MediaSource, SourceError};

const VIDEO_PACKET_LEN: usize = 16;
const AUDIO_PACKET_LEN: usize = 12;
const TONE_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 0.25;

/// Shape of a generated stream.
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    /// Length in seconds
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub audio: AudioFormat,
    /// Audio frames per packet
    pub audio_packet_frames: u32,
}

impl Default for SyntheticStream {
    fn default() -> Self {
        Self {
            duration: 10.0,
            fps: 25.0,
            width: 320,
            height: 240,
            audio: AudioFormat::default(),
            audio_packet_frames: 1024,
        }
    }
}

impl SyntheticStream {
    pub fn video_frame_count(&self) -> u64 {
        (self.duration * self.fps).ceil().max(0.0) as u64
    }

    pub fn audio_frame_count(&self) -> u64 {
        (self.duration * self.audio.sample_rate as f64).round().max(0.0) as u64
    }

    /// Source positioned at the first units at or after `start` seconds.
    pub fn source(&self, start: f64) -> SyntheticSource {
        let start = start.max(0.0);
        SyntheticSource {
            stream: self.clone(),
            next_video: (start * self.fps).ceil() as u64,
            next_audio_frame: (start * self.audio.sample_rate as f64).round() as u64,
        }
    }

    pub fn video_decoder(&self) -> PatternDecoder {
        PatternDecoder
    }

    pub fn audio_decoder(&self) -> Result<ToneDecoder, DecodeError> {
        if self.audio.sample_format != SampleFormat::I16 {
            return Err(DecodeError::Unsupported(format!(
                "tone generator outputs 16-bit PCM, not {:?}",
                self.audio.sample_format
            )));
        }
        Ok(ToneDecoder { format: self.audio })
    }
}

/// Interleaves video and audio packets in timestamp order.
pub struct SyntheticSource {
    stream: SyntheticStream,
    next_video: u64,
    next_audio_frame: u64,
}

impl SyntheticSource {
    fn video_time(&self) -> Option<f64> {
        (self.next_video < self.stream.video_frame_count())
            .then(|| self.next_video as f64 / self.stream.fps)
    }

    fn audio_time(&self) -> Option<f64> {
        (self.next_audio_frame < self.stream.audio_frame_count())
            .then(|| self.next_audio_frame as f64 / self.stream.audio.sample_rate as f64)
    }

    fn video_packet(&mut self) -> Packet {
        let index = self.next_video;
        self.next_video += 1;

        let mut data = Vec::with_capacity(VIDEO_PACKET_LEN);
        data.extend_from_slice(&index.to_le_bytes());
        data.extend_from_slice(&self.stream.width.to_le_bytes());
        data.extend_from_slice(&self.stream.height.to_le_bytes());

        let time_base = TimeBase::MPEG;
        let pts = time_base.from_seconds(index as f64 / self.stream.fps);
        Packet::new(MediaKind::Video, data, time_base)
            .with_pts(pts)
            .with_duration(time_base.from_seconds(1.0 / self.stream.fps))
            .with_key(true)
    }

    fn audio_packet(&mut self) -> Packet {
        let first = self.next_audio_frame;
        let remaining = self.stream.audio_frame_count() - first;
        let count = remaining.min(self.stream.audio_packet_frames.max(1) as u64) as u32;
        self.next_audio_frame += count as u64;

        let mut data = Vec::with_capacity(AUDIO_PACKET_LEN);
        data.extend_from_slice(&first.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());

        Packet::new(
            MediaKind::Audio,
            data,
            TimeBase::per_second(self.stream.audio.sample_rate),
        )
        .with_pts(first as i64)
        .with_duration(count as i64)
        .with_key(true)
    }
}

impl MediaSource for SyntheticSource {
    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        let packet = match (self.video_time(), self.audio_time()) {
            (None, None) => return Ok(None),
            (Some(_), None) => self.video_packet(),
            (None, Some(_)) => self.audio_packet(),
            (Some(video), Some(audio)) if video <= audio => self.video_packet(),
            (Some(_), Some(_)) => self.audio_packet(),
        };
        Ok(Some(packet))
    }

    fn duration(&self) -> Option<f64> {
        Some(self.stream.duration)
    }
}

/// Expands video descriptors into solid-colour RGBA frames.
#[derive(Debug, Default)]
pub struct PatternDecoder;

impl VideoDecoder for PatternDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>, DecodeError> {
        let data = &packet.data;
        if data.len() != VIDEO_PACKET_LEN {
            return Err(DecodeError::Malformed(format!(
                "video descriptor is {} bytes, expected {}",
                data.len(),
                VIDEO_PACKET_LEN
            )));
        }
        let index = u64::from_le_bytes(read_array(&data[0..8]));
        let width = u32::from_le_bytes(read_array(&data[8..12]));
        let height = u32::from_le_bytes(read_array(&data[12..16]));
        if width == 0 || height == 0 {
            return Err(DecodeError::Malformed(format!("zero frame size {}x{}", width, height)));
        }

        let pixel = [
            (index.wrapping_mul(37) % 256) as u8,
            (index.wrapping_mul(89) % 256) as u8,
            (index.wrapping_mul(151) % 256) as u8,
            u8::MAX,
        ];
        let data = pixel.repeat(width as usize * height as usize);
        let pts = packet.pts_seconds().unwrap_or_default();
        Ok(vec![VideoFrame::new(data, width, height, pts)])
    }
}

/// Expands audio descriptors into a 440 Hz sine on every channel.
#[derive(Debug)]
pub struct ToneDecoder {
    format: AudioFormat,
}

impl AudioDecoder for ToneDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<u8>, DecodeError> {
        let data = &packet.data;
        if data.len() != AUDIO_PACKET_LEN {
            return Err(DecodeError::Malformed(format!(
                "audio descriptor is {} bytes, expected {}",
                data.len(),
                AUDIO_PACKET_LEN
            )));
        }
        let first = u64::from_le_bytes(read_array(&data[0..8]));
        let count = u32::from_le_bytes(read_array(&data[8..12])) as u64;

        let rate = self.format.sample_rate as f64;
        let channels = self.format.channels as usize;
        let mut pcm = Vec::with_capacity(count as usize * self.format.frame_bytes());
        for n in first..first + count {
            let phase = TAU * TONE_HZ * n as f64 / rate;
            let sample = (phase.sin() * TONE_AMPLITUDE * i16::MAX as f64) as i16;
            for _ in 0..channels {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
        }
        Ok(pcm)
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_stream() -> SyntheticStream {
        SyntheticStream {
            duration: 0.2,
            fps: 10.0,
            width: 4,
            height: 2,
            audio: AudioFormat::default(),
            audio_packet_frames: 2_205,
        }
    }

    fn drain(source: &mut SyntheticSource) -> Vec<Packet> {
        std::iter::from_fn(|| source.read_packet().ok().flatten()).collect()
    }

    #[test]
    fn test_counts() {
        let stream = short_stream();
        assert_eq!(stream.video_frame_count(), 2);
        assert_eq!(stream.audio_frame_count(), 8_820);
    }

    #[test]
    fn test_packets_interleave_in_time_order() {
        let stream = short_stream();
        let packets = drain(&mut stream.source(0.0));

        let times: Vec<f64> = packets.iter().filter_map(|p| p.pts_seconds()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1] + 1e-9));

        let video = packets.iter().filter(|p| p.kind == MediaKind::Video).count();
        let audio_frames: i64 = packets
            .iter()
            .filter(|p| p.kind == MediaKind::Audio)
            .map(|p| p.duration)
            .sum();
        assert_eq!(video, 2);
        assert_eq!(audio_frames, 8_820);
    }

    #[test]
    fn test_source_starts_at_offset() {
        let stream = short_stream();
        let packets = drain(&mut stream.source(0.1));
        let first_video = packets.iter().find(|p| p.kind == MediaKind::Video);
        assert_eq!(first_video.and_then(|p| p.pts_seconds()), Some(0.1));
        let first_audio = packets.iter().find(|p| p.kind == MediaKind::Audio);
        assert_eq!(first_audio.and_then(|p| p.pts), Some(4_410));
    }

    #[test]
    fn test_pattern_decoder_frame() -> Result<(), DecodeError> {
        let stream = short_stream();
        let mut source = stream.source(0.0);
        let packet = drain(&mut source)
            .into_iter()
            .find(|p| p.kind == MediaKind::Video)
            .ok_or_else(|| DecodeError::Codec("no video packet".into()))?;

        let frames = stream.video_decoder().decode(&packet)?;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].size(), (4, 2));
        assert_eq!(frames[0].data.len(), frames[0].expected_len());
        Ok(())
    }

    #[test]
    fn test_tone_decoder_output_size() -> Result<(), DecodeError> {
        let stream = short_stream();
        let mut decoder = stream.audio_decoder()?;
        let pcm: usize = drain(&mut stream.source(0.0))
            .iter()
            .filter(|p| p.kind == MediaKind::Audio)
            .map(|p| decoder.decode(p).map(|pcm| pcm.len()))
            .sum::<Result<usize, _>>()?;
        assert_eq!(pcm, 8_820 * 4);
        Ok(())
    }

    #[test]
    fn test_malformed_descriptors() {
        let bad = Packet::new(MediaKind::Video, vec![1, 2, 3], TimeBase::MPEG);
        assert!(matches!(PatternDecoder.decode(&bad), Err(DecodeError::Malformed(_))));
        let mut tone = ToneDecoder {
            format: AudioFormat::default(),
        };
        assert!(matches!(tone.decode(&bad), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_float_format_rejected() {
        let stream = SyntheticStream {
            audio: AudioFormat::new(48_000, 2, SampleFormat::F32),
            ..short_stream()
        };
        assert!(stream.audio_decoder().is_err());
    }
}
