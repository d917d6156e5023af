//! Demuxer interface and the source stage loop.

use tracing::{debug, error, info, trace};

use crate::core::packet::{MediaKind, Packet};
use crate::playback::session::SessionContext;

/// Error type for media sources
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to open input: {0}")]
    Open(String),
    #[error("Failed to read packet: {0}")]
    Read(String),
    #[error("Input has no audio or video stream")]
    NoStreams,
    #[error("Seek failed: {0}")]
    Seek(String),
}

/// Yields coded packets of every stream in container order.
pub trait MediaSource: Send {
    /// Next packet, or `None` at end of input.
    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError>;

    /// Total duration in seconds if the container reports one.
    fn duration(&self) -> Option<f64> {
        None
    }
}

/// Source stage: route packets by kind until end of input or stop.
///
/// Packets for a stream whose queue is already finished (no decoder, or the
/// decoder shut down) are discarded. A read error ends the stream like EOF.
/// Both packet queues are marked finished on exit.
pub fn run_source(ctx: &SessionContext, source: &mut dyn MediaSource) {
    info!("source stage started");
    let mut routed_video = 0u64;
    let mut routed_audio = 0u64;

    while ctx.playing.is_playing() {
        let packet = match source.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                debug!("end of input");
                break;
            }
            Err(e) => {
                error!(error = %e, "read failed, ending input");
                break;
            }
        };

        let kind = packet.kind;
        match ctx.packet_queue(kind).push(packet) {
            Ok(()) => match kind {
                MediaKind::Video => routed_video += 1,
                MediaKind::Audio => routed_audio += 1,
            },
            Err(dropped) => {
                trace!(kind = %dropped.kind, size = dropped.size(), "queue closed, packet discarded");
            }
        }
    }

    ctx.video_packets.set_finished(true);
    ctx.audio_packets.set_finished(true);
    info!(video = routed_video, audio = routed_audio, "source stage finished");
}
