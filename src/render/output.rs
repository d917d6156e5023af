//! Video presentation stage.

use tracing::{debug, error, info, trace};

use crate::playback::session::SessionContext;
use crate::playback::sync::{video_correction, VideoCorrection};
use crate::render::surface::PresentationSurface;

/// Pop frames, wait for or drop them against the master clock, present.
///
/// The surface is resized before the first frame and whenever the frame
/// size changes. A surface error is fatal for this stage: the frame queue
/// is closed and drained so the decoder upstream stops too.
pub fn run_video_output(ctx: &SessionContext, surface: &mut dyn PresentationSurface) {
    info!("video output stage started");
    let mut size: Option<(u32, u32)> = None;
    let mut presented = 0u64;

    while ctx.playing.is_playing() {
        let Some(frame) = ctx.video_frames.pop() else {
            debug!("frame queue drained");
            break;
        };
        if !ctx.playing.wait_while_paused() {
            break;
        }

        let delay = frame.pts - ctx.clock.current_time();
        let correction = video_correction(delay);
        ctx.metrics.record_video(correction, delay);
        match correction {
            VideoCorrection::Drop => {
                trace!(pts = frame.pts, delay, "late frame dropped");
                continue;
            }
            VideoCorrection::Wait(wait) => {
                if !ctx.playing.sleep(wait) || !ctx.playing.wait_while_paused() {
                    break;
                }
            }
            VideoCorrection::Present => {}
        }

        if size != Some(frame.size()) {
            if let Err(e) = surface.resize(frame.width, frame.height) {
                error!(error = %e, width = frame.width, height = frame.height, "surface resize failed");
                close_input(ctx);
                break;
            }
            size = Some(frame.size());
        }

        if let Err(e) = surface.present(&frame) {
            error!(error = %e, pts = frame.pts, "present failed, stopping video output");
            close_input(ctx);
            break;
        }
        ctx.metrics.record_presented();
        presented += 1;
    }

    info!(frames = presented, "video output stage finished");
}

fn close_input(ctx: &SessionContext) {
    ctx.video_frames.set_finished(true);
    ctx.video_frames.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::decode::decoder::VideoFrame;
    use crate::playback::clock::MasterClock;
    use crate::render::surface::SurfaceError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        resizes: Vec<(u32, u32)>,
        presented: Vec<f64>,
    }

    struct LoggingSurface {
        log: Arc<Mutex<Log>>,
        fail_on_present: bool,
    }

    impl PresentationSurface for LoggingSurface {
        fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
            self.log.lock().resizes.push((width, height));
            Ok(())
        }

        fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError> {
            if self.fail_on_present {
                return Err(SurfaceError::InvalidFrame("lost device".into()));
            }
            self.log.lock().presented.push(frame.pts);
            Ok(())
        }
    }

    fn frame(w: u32, h: u32, pts: f64) -> VideoFrame {
        VideoFrame::new(vec![0; (w * h * 4) as usize], w, h, pts)
    }

    fn context(clock_at: f64) -> SessionContext {
        let clock = Arc::new(MasterClock::default());
        clock.seek_to(clock_at);
        SessionContext::new(&PlayerConfig::default(), clock, clock_at)
    }

    #[test]
    fn test_drops_late_and_presents_rest() {
        let ctx = context(5.0);
        for pts in [4.0, 4.95, 5.0, 30.0] {
            assert!(ctx.video_frames.push(frame(2, 2, pts)).is_ok());
        }
        ctx.video_frames.set_finished(true);

        let log = Arc::new(Mutex::new(Log::default()));
        let mut surface = LoggingSurface {
            log: Arc::clone(&log),
            fail_on_present: false,
        };
        run_video_output(&ctx, &mut surface);

        // 4.0 is 1 s late; 30.0 is far enough ahead to show at once
        assert_eq!(log.lock().presented, vec![4.95, 5.0, 30.0]);
        let snapshot = ctx.metrics_snapshot();
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.frames_presented, 3);
    }

    #[test]
    fn test_waits_for_early_frame() {
        let ctx = context(0.0);
        assert!(ctx.video_frames.push(frame(1, 1, 0.05)).is_ok());
        ctx.video_frames.set_finished(true);

        let log = Arc::new(Mutex::new(Log::default()));
        let mut surface = LoggingSurface {
            log: Arc::clone(&log),
            fail_on_present: false,
        };
        let start = std::time::Instant::now();
        run_video_output(&ctx, &mut surface);

        assert!(start.elapsed() >= std::time::Duration::from_millis(50));
        assert_eq!(ctx.metrics_snapshot().frames_waited, 1);
        assert_eq!(log.lock().presented.len(), 1);
    }

    #[test]
    fn test_resizes_on_size_change() {
        let ctx = context(0.0);
        for (w, h) in [(2, 2), (2, 2), (4, 2), (4, 2), (2, 2)] {
            assert!(ctx.video_frames.push(frame(w, h, 0.0)).is_ok());
        }
        ctx.video_frames.set_finished(true);

        let log = Arc::new(Mutex::new(Log::default()));
        let mut surface = LoggingSurface {
            log: Arc::clone(&log),
            fail_on_present: false,
        };
        run_video_output(&ctx, &mut surface);

        assert_eq!(log.lock().resizes, vec![(2, 2), (4, 2), (2, 2)]);
    }

    #[test]
    fn test_present_failure_closes_queue() {
        let ctx = context(0.0);
        for _ in 0..3 {
            assert!(ctx.video_frames.push(frame(1, 1, 0.0)).is_ok());
        }

        let log = Arc::new(Mutex::new(Log::default()));
        let mut surface = LoggingSurface {
            log: Arc::clone(&log),
            fail_on_present: true,
        };
        run_video_output(&ctx, &mut surface);

        assert!(ctx.video_frames.is_finished());
        assert!(ctx.video_frames.is_empty());
        assert!(log.lock().presented.is_empty());
    }
}
