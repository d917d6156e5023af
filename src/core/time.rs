//! Stream time bases and second conversions.
//!
//! Coded units carry ticks in the time base of the stream they came from.
//! Everything downstream of the decoders (frames, the master clock, drift)
//! works in seconds as `f64`.

use std::fmt;
use std::time::Duration;

/// Nanoseconds in one second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Rational time base: `ticks * num / den = seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    /// Microsecond ticks, the container-level default.
    pub const MICROS: TimeBase = TimeBase::new(1, 1_000_000);
    /// 90 kHz ticks, common for MPEG video streams.
    pub const MPEG: TimeBase = TimeBase::new(1, 90_000);

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Ticks counted at `rate` per second (e.g. an audio sample rate).
    pub const fn per_second(rate: u32) -> Self {
        Self::new(1, rate as i32)
    }

    /// Convert ticks in this base to seconds. A zero denominator yields 0.
    pub fn to_seconds(&self, ticks: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ticks as f64 * self.num as f64 / self.den as f64
    }

    /// Convert seconds to the nearest tick in this base.
    pub fn from_seconds(&self, seconds: f64) -> i64 {
        if self.num == 0 {
            return 0;
        }
        (seconds * self.den as f64 / self.num as f64).round() as i64
    }

    /// Move ticks from this base into `other` without going through floats.
    pub fn rescale(&self, ticks: i64, other: TimeBase) -> i64 {
        if self.den == 0 || other.num == 0 {
            return 0;
        }
        // i128 keeps 90 kHz * multi-hour timestamps from overflowing
        let numerator = ticks as i128 * self.num as i128 * other.den as i128;
        let denominator = self.den as i128 * other.num as i128;
        (numerator / denominator) as i64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MICROS
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Seconds to a sleepable `Duration`. Negative, NaN and infinite inputs give zero.
pub fn duration_from_seconds(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

/// Format seconds as HH:MM:SS.mmm (negative values clamp to zero).
pub fn format_time(seconds: f64) -> String {
    let total_millis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as i64
    } else {
        0
    };
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_seconds() {
        assert!((TimeBase::MPEG.to_seconds(90_000) - 1.0).abs() < 1e-9);
        assert!((TimeBase::MPEG.to_seconds(3_600) - 0.04).abs() < 1e-9);
        assert!((TimeBase::per_second(44_100).to_seconds(22_050) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_seconds_rounds() {
        assert_eq!(TimeBase::MPEG.from_seconds(0.04), 3_600);
        assert_eq!(TimeBase::MICROS.from_seconds(1.5), 1_500_000);
        assert_eq!(TimeBase::new(1, 3).from_seconds(0.5), 2);
    }

    #[test]
    fn test_degenerate_bases() {
        assert_eq!(TimeBase::new(1, 0).to_seconds(1234), 0.0);
        assert_eq!(TimeBase::new(0, 1).from_seconds(2.0), 0);
        assert_eq!(TimeBase::new(1, 0).rescale(10, TimeBase::MICROS), 0);
    }

    #[test]
    fn test_rescale() {
        // 2 seconds at 90 kHz -> microseconds
        assert_eq!(TimeBase::MPEG.rescale(180_000, TimeBase::MICROS), 2_000_000);
        // 10 hours at 90 kHz does not overflow
        let ten_hours = 10 * 3600 * 90_000i64;
        assert_eq!(
            TimeBase::MPEG.rescale(ten_hours, TimeBase::new(1, NANOS_PER_SECOND as i32)),
            10 * 3600 * NANOS_PER_SECOND
        );
    }

    #[test]
    fn test_duration_from_seconds() {
        assert_eq!(duration_from_seconds(0.25), Duration::from_millis(250));
        assert_eq!(duration_from_seconds(-1.0), Duration::ZERO);
        assert_eq!(duration_from_seconds(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_seconds(f64::INFINITY), Duration::ZERO);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(3661.5), "01:01:01.500");
        assert_eq!(format_time(0.04), "00:00:00.040");
        assert_eq!(format_time(-3.0), "00:00:00.000");
    }

    #[test]
    fn test_display() {
        assert_eq!(TimeBase::MPEG.to_string(), "1/90000");
    }
}
