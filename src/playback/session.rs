//! One playback session: the shared context and the five stage threads.
//!
//! ```text
//! source ──► video packets ──► video-decode ──► frames ──► video-out
//!        └─► audio packets ──► audio-decode ──► ring   ──► audio-out
//!                                   master clock ◄─┴───────────┘ (read)
//! ```
//!
//! A session plays from a fixed start position until end of input or until
//! it is stopped. Repositioning means stopping the session and starting a
//! fresh one, so no stale unit ever crosses a seek.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use tracing::{debug, error, info};

use crate::audio::format::AudioFormat;
use crate::audio::output::run_audio_output;
use crate::audio::ring_buffer::SampleRingBuffer;
use crate::audio::sink::AudioSink;
use crate::config::PlayerConfig;
use crate::core::packet::MediaKind;
use crate::core::queue::PacketQueue;
use crate::decode::decoder::{AudioDecoder, FrameQueue, VideoDecoder};
use crate::decode::stage::{run_audio_decode, run_video_decode};
use crate::media::source::{run_source, MediaSource};
use crate::playback::clock::MasterClock;
use crate::playback::flag::PlayFlag;
use crate::playback::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::render::output::run_video_output;
use crate::render::surface::PresentationSurface;

/// Error type for session startup
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle notifications from session threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StageExited { session: u64, stage: &'static str },
    /// Every stage thread of the session has exited
    Completed { session: u64 },
}

/// Everything the stages of one session share.
#[derive(Clone)]
pub struct SessionContext {
    pub video_packets: Arc<PacketQueue>,
    pub audio_packets: Arc<PacketQueue>,
    pub video_frames: Arc<FrameQueue>,
    pub audio_samples: Arc<SampleRingBuffer>,
    pub clock: Arc<MasterClock>,
    pub playing: Arc<PlayFlag>,
    pub metrics: Arc<PipelineMetrics>,
    pub audio_format: AudioFormat,
    pub chunk_bytes: usize,
    pub block_on_full: bool,
    /// Media time the session starts at, in seconds
    pub start_time: f64,
}

impl SessionContext {
    pub fn new(config: &PlayerConfig, clock: Arc<MasterClock>, start_time: f64) -> Self {
        Self {
            video_packets: Arc::new(PacketQueue::bounded(config.queues.packet_capacity)),
            audio_packets: Arc::new(PacketQueue::bounded(config.queues.packet_capacity)),
            video_frames: Arc::new(FrameQueue::bounded(config.queues.frame_capacity)),
            audio_samples: Arc::new(SampleRingBuffer::new(config.audio.ring_buffer_bytes)),
            clock,
            playing: Arc::new(PlayFlag::new()),
            metrics: Arc::new(PipelineMetrics::new()),
            audio_format: config.audio_format(),
            chunk_bytes: config.audio.chunk_bytes,
            block_on_full: config.audio.block_on_full,
            start_time,
        }
    }

    pub fn packet_queue(&self, kind: MediaKind) -> &PacketQueue {
        match kind {
            MediaKind::Video => &self.video_packets,
            MediaKind::Audio => &self.audio_packets,
        }
    }

    /// Mark every queue and the ring finished, releasing all blocked stages.
    pub fn finish_all(&self) {
        self.video_packets.set_finished(true);
        self.audio_packets.set_finished(true);
        self.video_frames.set_finished(true);
        self.audio_samples.set_finished(true);
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.audio_samples.dropped_bytes())
    }
}

pub struct VideoStages {
    pub decoder: Box<dyn VideoDecoder>,
    pub surface: Box<dyn PresentationSurface>,
}

pub struct AudioStages {
    pub decoder: Box<dyn AudioDecoder>,
    pub sink: Box<dyn AudioSink>,
}

/// Components for one session. A missing stream leaves its half unset.
pub struct Stages {
    pub source: Box<dyn MediaSource>,
    pub video: Option<VideoStages>,
    pub audio: Option<AudioStages>,
}

/// Running session. Dropping it stops and joins every thread.
pub struct Session {
    id: u64,
    ctx: SessionContext,
    threads: Vec<(&'static str, JoinHandle<()>)>,
    remaining: Arc<AtomicUsize>,
    events: Option<Sender<SessionEvent>>,
}

impl Session {
    /// Spawn the stage threads.
    ///
    /// If any spawn fails the threads already running are stopped and joined
    /// before the error is returned.
    pub fn start(
        id: u64,
        ctx: SessionContext,
        stages: Stages,
        events: Option<Sender<SessionEvent>>,
    ) -> Result<Self, SessionError> {
        let Stages {
            mut source,
            video,
            audio,
        } = stages;

        if video.is_none() {
            ctx.video_packets.set_finished(true);
            ctx.video_frames.set_finished(true);
        }
        if audio.is_none() {
            ctx.audio_packets.set_finished(true);
            ctx.audio_samples.set_finished(true);
        }

        let stage_count = 1 + 2 * (video.is_some() as usize + audio.is_some() as usize);
        let mut session = Session {
            id,
            ctx: ctx.clone(),
            threads: Vec::with_capacity(stage_count),
            remaining: Arc::new(AtomicUsize::new(stage_count)),
            events,
        };

        let stage_ctx = ctx.clone();
        session.spawn_stage("source", move || run_source(&stage_ctx, source.as_mut()))?;

        if let Some(VideoStages {
            mut decoder,
            mut surface,
        }) = video
        {
            let stage_ctx = ctx.clone();
            session.spawn_stage("video-decode", move || {
                run_video_decode(&stage_ctx, decoder.as_mut())
            })?;
            let stage_ctx = ctx.clone();
            session.spawn_stage("video-out", move || {
                run_video_output(&stage_ctx, surface.as_mut())
            })?;
        }

        if let Some(AudioStages {
            mut decoder,
            mut sink,
        }) = audio
        {
            let stage_ctx = ctx.clone();
            session.spawn_stage("audio-decode", move || {
                run_audio_decode(&stage_ctx, decoder.as_mut())
            })?;
            let stage_ctx = ctx;
            session.spawn_stage("audio-out", move || {
                run_audio_output(&stage_ctx, sink.as_mut())
            })?;
        }

        info!(session = id, stages = stage_count, start = session.ctx.start_time, "session started");
        Ok(session)
    }

    fn spawn_stage<F>(&mut self, stage: &'static str, body: F) -> Result<(), SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.id;
        let remaining = Arc::clone(&self.remaining);
        let events = self.events.clone();

        let handle = thread::Builder::new()
            .name(stage.to_string())
            .spawn(move || {
                if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
                    error!(session = id, stage, "stage panicked");
                }
                debug!(session = id, stage, "stage exited");
                if let Some(events) = &events {
                    let _ = events.send(SessionEvent::StageExited { session: id, stage });
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(events) = &events {
                        let _ = events.send(SessionEvent::Completed { session: id });
                    }
                }
            })
            .map_err(|source| SessionError::Spawn { stage, source })?;

        self.threads.push((stage, handle));
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn pause(&self) {
        self.ctx.playing.pause();
    }

    pub fn resume(&self) {
        self.ctx.playing.resume();
    }

    /// True once every stage thread has exited on its own.
    pub fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    /// Join the threads after they finish naturally.
    pub fn wait(mut self) -> MetricsSnapshot {
        self.join_all();
        self.ctx.metrics_snapshot()
    }

    /// Clear the play flag, finish every queue, and join every thread.
    pub fn stop(mut self) -> MetricsSnapshot {
        self.shutdown();
        self.ctx.metrics_snapshot()
    }

    fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.ctx.playing.stop();
        self.ctx.finish_all();
        self.join_all();
        info!(session = self.id, "session stopped");
    }

    fn join_all(&mut self) {
        for (stage, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                error!(session = self.id, stage, "stage thread failed to join");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
