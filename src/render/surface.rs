//! Presentation surfaces for decoded video.
//!
//! The video stage calls [`PresentationSurface::resize`] whenever the frame
//! size changes (including before the first frame), then `present` for each
//! frame it decides to show.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::decode::decoder::VideoFrame;

/// Error type for presentation
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Surface I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Surface not configured for {width}x{height}")]
    NotConfigured { width: u32, height: u32 },
}

pub trait PresentationSurface: Send {
    /// (Re)initialize for frames of the given size.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;

    /// Show one RGBA frame.
    fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError>;
}

/// Check a frame against the configured surface size and its own dimensions.
pub fn validate_frame(frame: &VideoFrame, configured: Option<(u32, u32)>) -> Result<(), SurfaceError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(SurfaceError::InvalidFrame(format!(
            "zero-sized frame {}x{}",
            frame.width, frame.height
        )));
    }
    if frame.data.len() != frame.expected_len() {
        return Err(SurfaceError::InvalidFrame(format!(
            "{}x{} RGBA needs {} bytes, got {}",
            frame.width,
            frame.height,
            frame.expected_len(),
            frame.data.len()
        )));
    }
    if configured != Some(frame.size()) {
        return Err(SurfaceError::NotConfigured {
            width: frame.width,
            height: frame.height,
        });
    }
    Ok(())
}

/// Surface that validates and counts frames without showing them.
#[derive(Debug, Default)]
pub struct NullSurface {
    size: Option<(u32, u32)>,
    presented: u64,
}

impl NullSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl PresentationSurface for NullSurface {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.size = Some((width, height));
        Ok(())
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError> {
        validate_frame(frame, self.size)?;
        self.presented += 1;
        Ok(())
    }
}

/// Surface that appends every presented frame's raw RGBA bytes to a file.
///
/// The output can be inspected with e.g.
/// `ffplay -f rawvideo -pixel_format rgba -video_size WxH out.rgba`.
pub struct RawFileSurface {
    path: PathBuf,
    writer: BufWriter<File>,
    size: Option<(u32, u32)>,
    frames: u64,
}

impl RawFileSurface {
    /// Truncate (or create) `path` and write frames from the start.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SurfaceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        info!(path = %path.display(), "writing raw RGBA frames");
        Ok(Self::with_file(path, file))
    }

    /// Keep existing contents of `path` and add frames after them.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, SurfaceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "appending raw RGBA frames");
        Ok(Self::with_file(path, file))
    }

    fn with_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            writer: BufWriter::new(file),
            size: None,
            frames: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PresentationSurface for RawFileSurface {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if self.size.is_some() {
            self.writer.flush()?;
        }
        info!(width, height, "raw surface reinitialized");
        self.size = Some((width, height));
        Ok(())
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError> {
        validate_frame(frame, self.size)?;
        self.writer.write_all(&frame.data)?;
        self.frames += 1;
        debug!(pts = frame.pts, frame = self.frames, "frame written");
        Ok(())
    }
}

impl Drop for RawFileSurface {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
