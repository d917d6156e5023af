//! Decode stage loops.
//!
//! Each loop pops packets until its input queue is finished and drained,
//! hands them to the decoder, and forwards the output downstream. A packet
//! that fails to decode is logged, counted, and skipped.

use tracing::{debug, info, warn};

use crate::decode::decoder::{AudioDecoder, VideoDecoder, VideoFrame};
use crate::playback::session::SessionContext;

/// Video decode stage: packets in, RGBA frames out.
///
/// If the frame queue is closed underneath it (the presenter has shut
/// down), the stage closes its own input so the source stops queueing
/// video, and exits.
pub fn run_video_decode(ctx: &SessionContext, decoder: &mut dyn VideoDecoder) {
    info!("video decode stage started");
    let mut decoded = 0u64;
    let mut downstream_open = true;

    while let Some(packet) = ctx.video_packets.pop() {
        if !ctx.playing.is_playing() {
            break;
        }
        match decoder.decode(&packet) {
            Ok(frames) => {
                if !forward_frames(ctx, frames, &mut decoded) {
                    downstream_open = false;
                    break;
                }
            }
            Err(e) => {
                ctx.metrics.record_decode_error();
                warn!(error = %e, pts = ?packet.pts, "video packet skipped");
            }
        }
    }

    if downstream_open && ctx.playing.is_playing() {
        match decoder.flush() {
            Ok(frames) => {
                forward_frames(ctx, frames, &mut decoded);
            }
            Err(e) => warn!(error = %e, "video decoder flush failed"),
        }
    }

    if !downstream_open {
        debug!("frame queue closed, releasing video packets");
        ctx.video_packets.set_finished(true);
        ctx.video_packets.clear();
    }
    ctx.video_frames.set_finished(true);
    info!(frames = decoded, "video decode stage finished");
}

fn forward_frames(ctx: &SessionContext, frames: Vec<VideoFrame>, decoded: &mut u64) -> bool {
    for frame in frames {
        if ctx.video_frames.push(frame).is_err() {
            return false;
        }
        *decoded += 1;
    }
    true
}

/// Audio decode stage: packets in, PCM into the ring buffer.
///
/// With `block_on_full` the stage waits for ring space before each write;
/// otherwise a full ring truncates the write at a frame boundary. If the
/// ring is finished underneath it (the audio output has shut down), the
/// stage closes its own input like the video stage does.
pub fn run_audio_decode(ctx: &SessionContext, decoder: &mut dyn AudioDecoder) {
    info!("audio decode stage started");
    let mut accepted = 0u64;
    let mut downstream_open = true;

    while let Some(packet) = ctx.audio_packets.pop() {
        if !ctx.playing.is_playing() {
            break;
        }
        match decoder.decode(&packet) {
            Ok(pcm) => {
                if !write_pcm(ctx, &pcm, &mut accepted) {
                    downstream_open = false;
                    break;
                }
            }
            Err(e) => {
                ctx.metrics.record_decode_error();
                warn!(error = %e, pts = ?packet.pts, "audio packet skipped");
            }
        }
    }

    if downstream_open && ctx.playing.is_playing() {
        match decoder.flush() {
            Ok(pcm) => {
                write_pcm(ctx, &pcm, &mut accepted);
            }
            Err(e) => warn!(error = %e, "audio decoder flush failed"),
        }
    }

    if !downstream_open {
        debug!("sample ring closed, releasing audio packets");
        ctx.audio_packets.set_finished(true);
        ctx.audio_packets.clear();
    }
    ctx.audio_samples.set_finished(true);
    info!(
        bytes = accepted,
        dropped = ctx.audio_samples.dropped_bytes(),
        "audio decode stage finished"
    );
}

/// Returns false if the ring was finished by someone else while waiting.
fn write_pcm(ctx: &SessionContext, pcm: &[u8], accepted: &mut u64) -> bool {
    if pcm.is_empty() {
        return true;
    }
    if ctx.block_on_full && !ctx.audio_samples.wait_for_space(pcm.len()) {
        return false;
    }
    if ctx.audio_samples.is_finished() {
        return false;
    }
    let frame_bytes = ctx.audio_format.frame_bytes();
    *accepted += ctx.audio_samples.write_aligned(pcm, frame_bytes) as u64;
    true
}
