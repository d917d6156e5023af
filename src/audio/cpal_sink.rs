//! cpal-backed audio output.
//!
//! cpal streams cannot move between threads, so the stream is built and
//! owned by a dedicated `cpal-stream` thread. The sink hands samples to the
//! device callback through a bounded FIFO; `write` waits for FIFO space up to
//! its deadline, which gives the device's own consumption rate as
//! backpressure. The callback plays silence when the FIFO runs dry.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use crate::audio::format::{AudioFormat, SampleFormat};
use crate::audio::sink::{AudioSink, SinkError};

/// Samples buffered ahead of the device (per channel frame count)
const FIFO_FRAMES: usize = 8_192;

impl From<cpal::DefaultStreamConfigError> for SinkError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        SinkError::Device(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for SinkError {
    fn from(err: cpal::BuildStreamError) -> Self {
        SinkError::Device(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for SinkError {
    fn from(err: cpal::PlayStreamError) -> Self {
        SinkError::Device(err.to_string())
    }
}

struct SampleFifo {
    samples: Mutex<VecDeque<i16>>,
    space: Condvar,
    capacity: usize,
}

/// Audio sink on the default output device.
pub struct CpalSink {
    fifo: Arc<SampleFifo>,
    shutdown: Option<Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
    /// Low byte of a sample split across two writes
    carry: Option<u8>,
}

impl CpalSink {
    /// Open the default output device for `format` (16-bit PCM only).
    pub fn open(format: AudioFormat) -> Result<Self, SinkError> {
        if format.sample_format != SampleFormat::I16 {
            return Err(SinkError::UnsupportedFormat(format!("{:?}", format.sample_format)));
        }

        let fifo = Arc::new(SampleFifo {
            samples: Mutex::new(VecDeque::new()),
            space: Condvar::new(),
            capacity: FIFO_FRAMES * format.channels as usize,
        });
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), SinkError>>(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let callback_fifo = Arc::clone(&fifo);
        let stream_thread = thread::Builder::new()
            .name("cpal-stream".to_string())
            .spawn(move || {
                let stream = match build_stream(format, callback_fifo) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Hold the stream until the sink is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| SinkError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    sample_rate = format.sample_rate,
                    channels = format.channels,
                    "cpal output stream started"
                );
                Ok(Self {
                    fifo,
                    shutdown: Some(shutdown_tx),
                    stream_thread: Some(stream_thread),
                    carry: None,
                })
            }
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = stream_thread.join();
                Err(SinkError::Closed)
            }
        }
    }
}

fn build_stream(format: AudioFormat, fifo: Arc<SampleFifo>) -> Result<cpal::Stream, SinkError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
    let default_config = device.default_output_config()?;
    if default_config.sample_rate().0 != format.sample_rate {
        warn!(
            device_rate = default_config.sample_rate().0,
            stream_rate = format.sample_rate,
            "device default rate differs, requesting stream rate"
        );
    }

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // Never block the device thread; contention plays one buffer of silence
            let Some(mut samples) = fifo.samples.try_lock() else {
                data.fill(0.0);
                return;
            };
            for out in data.iter_mut() {
                *out = samples
                    .pop_front()
                    .map(|s| s as f32 / i16::MAX as f32)
                    .unwrap_or(0.0);
            }
            drop(samples);
            fifo.space.notify_all();
        },
        |err| error!(error = %err, "cpal stream error"),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

impl AudioSink for CpalSink {
    fn write(&mut self, pcm: &[u8], deadline: Duration) -> Result<usize, SinkError> {
        if self.shutdown.is_none() {
            return Err(SinkError::Closed);
        }
        if pcm.is_empty() {
            return Ok(0);
        }

        let carried = self.carry.take();
        let bytes: Cow<'_, [u8]> = match carried {
            Some(low) => {
                let mut joined = Vec::with_capacity(pcm.len() + 1);
                joined.push(low);
                joined.extend_from_slice(pcm);
                Cow::Owned(joined)
            }
            None => Cow::Borrowed(pcm),
        };

        let until = Instant::now() + deadline;
        let total = bytes.len() / 2;
        let mut pending = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]));
        let mut queued = 0usize;

        let mut samples = self.fifo.samples.lock();
        while queued < total {
            let room = self.fifo.capacity.saturating_sub(samples.len());
            if room == 0 {
                if self.fifo.space.wait_until(&mut samples, until).timed_out() {
                    break;
                }
                continue;
            }
            let take = room.min(total - queued);
            samples.extend(pending.by_ref().take(take));
            queued += take;
        }
        drop(samples);

        if queued == total {
            // An odd trailing byte waits for its partner in the next write
            if bytes.len() % 2 == 1 {
                self.carry = bytes.last().copied();
            }
            return Ok(pcm.len());
        }
        match carried {
            Some(_) if queued == 0 => {
                self.carry = carried;
                Ok(0)
            }
            Some(_) => Ok(queued * 2 - 1),
            None => Ok(queued * 2),
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        // Disconnecting the channel releases the stream thread
        self.shutdown.take();
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}
