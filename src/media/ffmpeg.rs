//! FFmpeg-backed demuxer and decoders.
//!
//! [`open`] opens a container, picks the best video and audio streams, and
//! returns a packet source plus one decoder per stream. Video is converted
//! to tightly packed RGBA, audio is resampled to the pipeline's PCM format.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{self, Pixel, Sample};
use ffmpeg::software::{resampling, scaling};
use ffmpeg::util::frame;
use ffmpeg::{codec, media, ChannelLayout, Rational};
use tracing::{debug, info};

use crate::audio::format::{AudioFormat, SampleFormat};
use crate::core::packet::{MediaKind, Packet};
use crate::core::time::TimeBase;
use crate::decode::decoder::{AudioDecoder, DecodeError, VideoDecoder, VideoFrame};
use crate::media::source::{MediaSource, SourceError};

impl From<ffmpeg::Error> for DecodeError {
    fn from(err: ffmpeg::Error) -> Self {
        DecodeError::Codec(err.to_string())
    }
}

fn time_base(rational: Rational) -> TimeBase {
    TimeBase::new(rational.numerator(), rational.denominator())
}

/// Source and decoders for one opened input.
pub struct OpenedMedia {
    pub source: FfmpegSource,
    pub video: Option<FfmpegVideoDecoder>,
    pub audio: Option<FfmpegAudioDecoder>,
}

/// Open `path`, position it at `start` seconds, and build decoders.
pub fn open(path: &Path, start: f64, output: AudioFormat) -> Result<OpenedMedia, SourceError> {
    ffmpeg::init().map_err(|e| SourceError::Open(format!("FFmpeg init failed: {}", e)))?;
    let mut input = format::input(&path)
        .map_err(|e| SourceError::Open(format!("{}: {}", path.display(), e)))?;

    let video = match input.streams().best(media::Type::Video) {
        Some(stream) => Some(
            FfmpegVideoDecoder::new(&stream)
                .map_err(|e| SourceError::Open(format!("video stream: {}", e)))?,
        ),
        None => None,
    };
    let audio = match input.streams().best(media::Type::Audio) {
        Some(stream) => Some(
            FfmpegAudioDecoder::new(&stream, output)
                .map_err(|e| SourceError::Open(format!("audio stream: {}", e)))?,
        ),
        None => None,
    };
    if video.is_none() && audio.is_none() {
        return Err(SourceError::NoStreams);
    }

    let duration = (input.duration() > 0).then(|| TimeBase::MICROS.to_seconds(input.duration()));
    if start > 0.0 {
        let target = TimeBase::MICROS.from_seconds(start);
        input
            .seek(target, ..target)
            .map_err(|e| SourceError::Seek(e.to_string()))?;
        debug!(start, "input repositioned");
    }

    info!(
        path = %path.display(),
        duration = ?duration,
        video = video.is_some(),
        audio = audio.is_some(),
        "input opened"
    );

    let source = FfmpegSource {
        video: video.as_ref().map(|d| (d.index, d.time_base)),
        audio: audio.as_ref().map(|d| (d.index, d.time_base)),
        input,
        duration,
        audio_from: start.max(0.0),
    };
    Ok(OpenedMedia {
        source,
        video,
        audio,
    })
}

/// Packet reader over an opened container.
pub struct FfmpegSource {
    input: format::context::Input,
    video: Option<(usize, TimeBase)>,
    audio: Option<(usize, TimeBase)>,
    duration: Option<f64>,
    /// Audio ending before this time is skipped after a seek
    audio_from: f64,
}

impl MediaSource for FfmpegSource {
    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(SourceError::Read(e.to_string())),
            }

            let index = packet.stream();
            let (kind, time_base) = match (self.video, self.audio) {
                (Some((video, tb)), _) if video == index => (MediaKind::Video, tb),
                (_, Some((audio, tb))) if audio == index => (MediaKind::Audio, tb),
                _ => continue,
            };

            let data = packet.data().map(|d| d.to_vec()).unwrap_or_default();
            let mut unit = Packet::new(kind, data, time_base)
                .with_duration(packet.duration())
                .with_key(packet.is_key());
            unit.pts = packet.pts();
            unit.dts = packet.dts();

            if kind == MediaKind::Audio {
                if let Some(pts) = unit.pts_seconds() {
                    if pts + unit.duration_seconds() < self.audio_from {
                        continue;
                    }
                }
            }
            return Ok(Some(unit));
        }
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

struct Scaler {
    context: scaling::Context,
    input: (Pixel, u32, u32),
}

// SAFETY: the scaling context is owned by one decoder and only used from
// the thread that currently owns that decoder.
unsafe impl Send for Scaler {}

/// Video decoder producing RGBA frames.
pub struct FfmpegVideoDecoder {
    index: usize,
    time_base: TimeBase,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<Scaler>,
}

impl FfmpegVideoDecoder {
    fn new(stream: &format::stream::Stream) -> Result<Self, DecodeError> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;
        debug!(
            index = stream.index(),
            width = decoder.width(),
            height = decoder.height(),
            "video decoder ready"
        );
        Ok(Self {
            index: stream.index(),
            time_base: time_base(stream.time_base()),
            decoder,
            scaler: None,
        })
    }

    fn receive(&mut self) -> Result<Vec<VideoFrame>, DecodeError> {
        let mut frames = Vec::new();
        let mut decoded = frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            frames.push(self.convert(&decoded)?);
        }
        Ok(frames)
    }

    fn convert(&mut self, decoded: &frame::Video) -> Result<VideoFrame, DecodeError> {
        let input = (decoded.format(), decoded.width(), decoded.height());
        let (_, width, height) = input;

        let scaler = match self.scaler.take() {
            Some(scaler) if scaler.input == input => scaler,
            _ => Scaler {
                context: scaling::Context::get(
                    input.0,
                    width,
                    height,
                    Pixel::RGBA,
                    width,
                    height,
                    scaling::Flags::BILINEAR,
                )?,
                input,
            },
        };
        let scaler = self.scaler.insert(scaler);

        let mut rgba = frame::Video::empty();
        scaler.context.run(decoded, &mut rgba)?;

        // Strip row padding
        let stride = rgba.stride(0);
        let row = width as usize * 4;
        let plane = rgba.data(0);
        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            data.extend_from_slice(&plane[y * stride..y * stride + row]);
        }

        let pts = decoded
            .timestamp()
            .or_else(|| decoded.pts())
            .map(|ticks| self.time_base.to_seconds(ticks))
            .unwrap_or(0.0);
        Ok(VideoFrame::new(data, width, height, pts))
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>, DecodeError> {
        let mut av_packet = ffmpeg::Packet::copy(&packet.data);
        av_packet.set_pts(packet.pts);
        av_packet.set_dts(packet.dts);
        self.decoder.send_packet(&av_packet)?;
        self.receive()
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>, DecodeError> {
        self.decoder.send_eof()?;
        self.receive()
    }
}

struct Resampler {
    context: resampling::Context,
    input: (Sample, ChannelLayout, u32),
}

// SAFETY: as for `Scaler`, single owner, single thread at a time.
unsafe impl Send for Resampler {}

/// Audio decoder producing interleaved 16-bit PCM in the output format.
pub struct FfmpegAudioDecoder {
    index: usize,
    time_base: TimeBase,
    decoder: ffmpeg::decoder::Audio,
    resampler: Option<Resampler>,
    output: AudioFormat,
}

impl FfmpegAudioDecoder {
    fn new(stream: &format::stream::Stream, output: AudioFormat) -> Result<Self, DecodeError> {
        if output.sample_format != SampleFormat::I16 {
            return Err(DecodeError::Unsupported(format!(
                "output sample format {:?}",
                output.sample_format
            )));
        }
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;
        debug!(
            index = stream.index(),
            rate = decoder.rate(),
            channels = decoder.channels(),
            "audio decoder ready"
        );
        Ok(Self {
            index: stream.index(),
            time_base: time_base(stream.time_base()),
            decoder,
            resampler: None,
            output,
        })
    }

    fn receive(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut pcm = Vec::new();
        let mut decoded = frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            self.convert(&mut decoded, &mut pcm)?;
        }
        Ok(pcm)
    }

    fn convert(&mut self, decoded: &mut frame::Audio, pcm: &mut Vec<u8>) -> Result<(), DecodeError> {
        if decoded.channel_layout().is_empty() {
            decoded.set_channel_layout(ChannelLayout::default(decoded.channels() as i32));
        }
        let input = (decoded.format(), decoded.channel_layout(), decoded.rate());

        let resampler = match self.resampler.take() {
            Some(resampler) if resampler.input == input => resampler,
            _ => Resampler {
                context: resampling::Context::get(
                    input.0,
                    input.1,
                    input.2,
                    Sample::I16(format::sample::Type::Packed),
                    ChannelLayout::default(self.output.channels as i32),
                    self.output.sample_rate,
                )?,
                input,
            },
        };
        let resampler = self.resampler.insert(resampler);

        let mut converted = frame::Audio::empty();
        resampler.context.run(decoded, &mut converted)?;

        let plane = converted.data(0);
        let len = (converted.samples() * self.output.frame_bytes()).min(plane.len());
        pcm.extend_from_slice(&plane[..len]);
        Ok(())
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<u8>, DecodeError> {
        let mut av_packet = ffmpeg::Packet::copy(&packet.data);
        av_packet.set_pts(packet.pts);
        av_packet.set_dts(packet.dts);
        self.decoder.send_packet(&av_packet)?;
        self.receive()
    }

    fn flush(&mut self) -> Result<Vec<u8>, DecodeError> {
        self.decoder.send_eof()?;
        self.receive()
    }
}
