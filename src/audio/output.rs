//! Audio presentation stage.
//!
//! Reads fixed-size chunks from the ring buffer and writes them to the sink.
//! The position of a chunk is derived from the bytes already emitted, so
//! drift is measured against what the listener has actually been given.

use tracing::{debug, error, info, trace};

use crate::audio::sink::{AudioSink, SinkError};
use crate::playback::session::SessionContext;
use crate::playback::sync::{audio_correction, AudioCorrection, Cadence};

/// Run until the ring is finished and drained, the session stops, or the
/// sink fails.
pub fn run_audio_output(ctx: &SessionContext, sink: &mut dyn AudioSink) {
    let format = ctx.audio_format;
    let mut chunk = vec![0u8; format.align(ctx.chunk_bytes)];
    let mut emitted: u64 = 0;
    info!(chunk_bytes = chunk.len(), "audio output stage started");

    while ctx.playing.is_playing() {
        let read = ctx.audio_samples.read(&mut chunk);
        if read == 0 {
            debug!("audio ring drained");
            break;
        }
        if !ctx.playing.wait_while_paused() {
            break;
        }

        let position = ctx.start_time + format.bytes_to_seconds(emitted);
        let delay = position - ctx.clock.current_time();

        let cadence = match audio_correction(delay) {
            AudioCorrection::Write(cadence) => cadence,
            AudioCorrection::Resync(pause) => {
                ctx.metrics.record_resync();
                debug!(delay, pause_ms = pause.as_millis() as u64, "audio ahead, resyncing");
                if !ctx.playing.sleep(pause) {
                    break;
                }
                Cadence::Nominal
            }
        };

        match write_chunk(ctx, sink, &chunk[..read], cadence) {
            Ok(written) => {
                emitted += written as u64;
                ctx.metrics.record_audio(cadence, delay, written);
                if written < read {
                    debug!(written, read, "session stopped mid-chunk");
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "audio sink failed, stopping audio output");
                ctx.audio_samples.set_finished(true);
                break;
            }
        }
    }

    info!(
        bytes = emitted,
        seconds = format.bytes_to_seconds(emitted),
        "audio output stage finished"
    );
}

/// Write all of `pcm`, retrying the remainder after partial writes.
///
/// Each retry gets the cadence deadline of what is left. Returns the bytes
/// written, which is short only if the session stopped in between.
fn write_chunk(
    ctx: &SessionContext,
    sink: &mut dyn AudioSink,
    pcm: &[u8],
    cadence: Cadence,
) -> Result<usize, SinkError> {
    let format = ctx.audio_format;
    let mut offset = 0;
    while offset < pcm.len() {
        let remaining = &pcm[offset..];
        let written = sink
            .write(remaining, cadence.deadline(format.duration_of(remaining.len())))?
            .min(remaining.len());
        offset += written;
        if offset < pcm.len() {
            trace!(written, left = pcm.len() - offset, "sink accepted a partial chunk");
            if !ctx.playing.wait_while_paused() {
                break;
            }
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::playback::clock::MasterClock;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        writes: Vec<(usize, Duration)>,
    }

    struct RecordingSink {
        log: Arc<Mutex<Recording>>,
        fail_after: Option<usize>,
        /// Accept only the first half (rounded up) of each write
        partial: bool,
    }

    impl AudioSink for RecordingSink {
        fn write(&mut self, pcm: &[u8], deadline: Duration) -> Result<usize, SinkError> {
            let mut log = self.log.lock();
            if self.fail_after == Some(log.writes.len()) {
                return Err(SinkError::Device("unplugged".into()));
            }
            let accepted = if self.partial {
                (pcm.len() + 1) / 2
            } else {
                pcm.len()
            };
            log.writes.push((accepted, deadline));
            Ok(accepted)
        }
    }

    fn context(start_time: f64, clock_at: f64) -> SessionContext {
        let clock = Arc::new(MasterClock::default());
        clock.seek_to(clock_at);
        SessionContext::new(&PlayerConfig::default(), clock, start_time)
    }

    #[test]
    fn test_drains_ring_in_chunks() {
        let ctx = context(0.0, 0.0);
        ctx.audio_samples.write(&vec![0u8; 5000]);
        ctx.audio_samples.set_finished(true);

        let log = Arc::new(Mutex::new(Recording::default()));
        let mut sink = RecordingSink {
            log: Arc::clone(&log),
            fail_after: None,
            partial: false,
        };
        run_audio_output(&ctx, &mut sink);

        let sizes: Vec<usize> = log.lock().writes.iter().map(|w| w.0).collect();
        assert_eq!(sizes, vec![2048, 2048, 904]);
        assert_eq!(ctx.metrics_snapshot().audio_bytes, 5000);
    }

    #[test]
    fn test_behind_clock_doubles_cadence() {
        // Clock stopped at 10 s while audio starts at 0: far behind
        let ctx = context(0.0, 10.0);
        ctx.audio_samples.write(&vec![0u8; 2048]);
        ctx.audio_samples.set_finished(true);

        let log = Arc::new(Mutex::new(Recording::default()));
        let mut sink = RecordingSink {
            log: Arc::clone(&log),
            fail_after: None,
            partial: false,
        };
        run_audio_output(&ctx, &mut sink);

        let chunk = ctx.audio_format.duration_of(2048);
        assert_eq!(log.lock().writes[0].1, chunk.div_f64(2.0));
        assert_eq!(ctx.metrics_snapshot().chunks_double, 1);
    }

    #[test]
    fn test_slightly_ahead_halves_cadence() {
        // Session starts 50 ms ahead of the clock
        let ctx = context(0.05, 0.0);
        ctx.audio_samples.write(&vec![0u8; 2048]);
        ctx.audio_samples.set_finished(true);

        let log = Arc::new(Mutex::new(Recording::default()));
        let mut sink = RecordingSink {
            log: Arc::clone(&log),
            fail_after: None,
            partial: false,
        };
        run_audio_output(&ctx, &mut sink);

        let chunk = ctx.audio_format.duration_of(2048);
        assert_eq!(log.lock().writes[0].1, chunk.div_f64(0.5));
        assert_eq!(ctx.metrics_snapshot().chunks_half, 1);
    }

    #[test]
    fn test_sink_failure_stops_stage() {
        let ctx = context(0.0, 0.0);
        ctx.audio_samples.write(&vec![0u8; 8192]);

        let log = Arc::new(Mutex::new(Recording::default()));
        let mut sink = RecordingSink {
            log: Arc::clone(&log),
            fail_after: Some(1),
            partial: false,
        };
        // Not finished by the producer: the stage must exit on its own
        run_audio_output(&ctx, &mut sink);

        assert_eq!(log.lock().writes.len(), 1);
        assert!(ctx.audio_samples.is_finished());
    }

    #[test]
    fn test_partial_writes_are_retried() {
        let ctx = context(0.0, 0.0);
        ctx.audio_samples.write(&vec![0u8; 8192]);
        ctx.audio_samples.set_finished(true);

        let log = Arc::new(Mutex::new(Recording::default()));
        let mut sink = RecordingSink {
            log: Arc::clone(&log),
            fail_after: None,
            partial: true,
        };
        run_audio_output(&ctx, &mut sink);

        let received: usize = log.lock().writes.iter().map(|w| w.0).sum();
        assert_eq!(received, 8192);
        let snapshot = ctx.metrics_snapshot();
        assert_eq!(snapshot.audio_bytes, 8192);
        assert_eq!(snapshot.audio_chunks(), 4);

        // Retries carry the deadline of the remainder only
        let writes = &log.lock().writes;
        let format = ctx.audio_format;
        assert_eq!(writes[0], (1024, Cadence::Nominal.deadline(format.duration_of(2048))));
        assert_eq!(writes[1], (512, Cadence::Nominal.deadline(format.duration_of(1024))));
    }
}
