//! Playback state machine.

use std::fmt;

/// Current state of the playback engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    /// No session running
    Stopped,
    /// A session is running; `from` is the position it started at
    Playing { from: f64 },
    /// A session exists but its stages and the clock are held
    Paused { position: f64 },
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing { from } => write!(f, "playing (from {:.3}s)", from),
            PlaybackState::Paused { position } => write!(f, "paused at {:.3}s", position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(PlaybackState::default().is_stopped());
        assert!(PlaybackState::Playing { from: 0.0 }.is_playing());
        assert!(PlaybackState::Paused { position: 1.0 }.is_paused());
        assert!(!PlaybackState::Paused { position: 1.0 }.is_playing());
    }

    #[test]
    fn test_display() {
        assert_eq!(PlaybackState::Paused { position: 1.5 }.to_string(), "paused at 1.500s");
    }
}
