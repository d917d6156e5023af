//! Drift-correction policy for the presentation stages.
//!
//! Both stages compute `delay = unit_time - master_clock` before emitting a
//! unit. Video corrects by waiting or dropping; audio corrects by pacing how
//! quickly it drains the ring buffer. The decisions are pure functions of
//! the delay so they can be tested without threads.

use std::time::Duration;

use crate::core::time::duration_from_seconds;

/// Video: frames earlier than this are shown immediately
pub const VIDEO_WAIT_MIN: f64 = 0.02;
/// Video: frames this far ahead or more are shown immediately instead of waited on
pub const VIDEO_WAIT_MAX: f64 = 1.0;
/// Video and audio: units later than this are dropped / hurried
pub const LATE_THRESHOLD: f64 = -0.1;
/// Audio: ahead by at least this, slow down consumption
pub const AUDIO_AHEAD_THRESHOLD: f64 = 0.02;
/// Audio: ahead by at least this, pause before writing
pub const AUDIO_RESYNC_THRESHOLD: f64 = 0.2;

/// What the video stage does with one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoCorrection {
    /// Present now
    Present,
    /// Sleep, then present
    Wait(Duration),
    /// Discard without presenting
    Drop,
}

/// Decide a frame's fate from its delay against the master clock.
///
/// | delay            | action              |
/// |------------------|---------------------|
/// | (0.02, 1.0)      | wait `delay`, show  |
/// | < -0.1           | drop                |
/// | otherwise        | show now            |
///
/// Frames at least a second early are shown at once, so a long pause or a
/// bad timestamp never stalls the stage.
pub fn video_correction(delay: f64) -> VideoCorrection {
    if delay > VIDEO_WAIT_MIN && delay < VIDEO_WAIT_MAX {
        VideoCorrection::Wait(duration_from_seconds(delay))
    } else if delay < LATE_THRESHOLD {
        VideoCorrection::Drop
    } else {
        VideoCorrection::Present
    }
}

/// Pacing of audio writes relative to real time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Consume audio at half speed (audio is ahead)
    Half,
    Nominal,
    /// Consume audio at double speed (audio is behind)
    Double,
}

impl Cadence {
    pub fn multiplier(&self) -> f64 {
        match self {
            Cadence::Half => 0.5,
            Cadence::Nominal => 1.0,
            Cadence::Double => 2.0,
        }
    }

    /// Sink write deadline for a chunk that plays for `chunk` at 1x.
    pub fn deadline(&self, chunk: Duration) -> Duration {
        chunk.div_f64(self.multiplier())
    }
}

/// What the audio stage does before writing one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioCorrection {
    /// Write with the given pacing
    Write(Cadence),
    /// Pause for the duration, then write at nominal pacing
    Resync(Duration),
}

/// Decide the pacing of an audio chunk from its delay.
///
/// | delay          | action                          |
/// |----------------|---------------------------------|
/// | >= 0.2         | pause 2 x delay, write nominal  |
/// | [0.02, 0.2)    | half cadence                    |
/// | < -0.1         | double cadence                  |
/// | otherwise      | nominal                         |
pub fn audio_correction(delay: f64) -> AudioCorrection {
    if delay >= AUDIO_RESYNC_THRESHOLD {
        AudioCorrection::Resync(duration_from_seconds(2.0 * delay))
    } else if delay >= AUDIO_AHEAD_THRESHOLD {
        AudioCorrection::Write(Cadence::Half)
    } else if delay < LATE_THRESHOLD {
        AudioCorrection::Write(Cadence::Double)
    } else {
        AudioCorrection::Write(Cadence::Nominal)
    }
}
