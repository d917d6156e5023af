//! Coded packets as they leave the demuxer.

use std::fmt;

use crate::core::time::TimeBase;

/// Which elementary stream a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Compressed data unit read from the container.
///
/// The pipeline owns the bytes; a packet is moved from the source into
/// its queue and from there into exactly one decoder.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: MediaKind,
    pub data: Vec<u8>,
    /// Presentation timestamp in `time_base` ticks
    pub pts: Option<i64>,
    /// Decode timestamp in `time_base` ticks
    pub dts: Option<i64>,
    /// Duration in `time_base` ticks (0 when unknown)
    pub duration: i64,
    pub time_base: TimeBase,
    pub key: bool,
}

impl Packet {
    pub fn new(kind: MediaKind, data: Vec<u8>, time_base: TimeBase) -> Self {
        Self {
            kind,
            data,
            pts: None,
            dts: None,
            duration: 0,
            time_base,
            key: false,
        }
    }

    /// Set the presentation timestamp; the decode timestamp follows it
    /// unless one was already set.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        if self.dts.is_none() {
            self.dts = Some(pts);
        }
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts.map(|pts| self.time_base.to_seconds(pts))
    }

    pub fn dts_seconds(&self) -> Option<f64> {
        self.dts.map(|dts| self.time_base.to_seconds(dts))
    }

    pub fn duration_seconds(&self) -> f64 {
        self.time_base.to_seconds(self.duration)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
