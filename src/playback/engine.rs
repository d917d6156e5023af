//! Playback engine: the control plane over sessions and the master clock.
//!
//! The engine owns the clock for the life of the process and at most one
//! running [`Session`]. Play/pause act on the running session in place;
//! seeking tears the session down and starts a fresh one at the target so
//! no queued unit from before the seek is ever presented.

use std::str::FromStr;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PlayerConfig};
use crate::decode::decoder::DecodeError;
use crate::audio::sink::SinkError;
use crate::media::source::SourceError;
use crate::playback::clock::{ClockError, MasterClock};
use crate::playback::metrics::MetricsSnapshot;
use crate::playback::session::{Session, SessionContext, SessionError, SessionEvent, Stages};
use crate::playback::state::PlaybackState;
use crate::render::surface::SurfaceError;

/// Command sent to playback engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Resume,
    Stop,
    /// Reposition to a media time in seconds
    Seek(f64),
    /// Change the time speed (must be > 0)
    SetRate(f64),
}

/// Error type for playback engine
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Audio error: {0}")]
    Sink(#[from] SinkError),
    #[error("Render error: {0}")]
    Surface(#[from] SurfaceError),
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid seek position {0}")]
    InvalidSeek(f64),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl FromStr for PlaybackCommand {
    type Err = PlaybackError;

    /// Parse `play`, `pause`, `resume`, `stop`, `seek <seconds>`, `rate <speed>`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();
        let number = |verb: &str| {
            argument
                .and_then(|a| a.parse::<f64>().ok())
                .ok_or_else(|| PlaybackError::InvalidCommand(format!("{} needs a number", verb)))
        };

        match verb.as_str() {
            "play" => Ok(PlaybackCommand::Play),
            "pause" => Ok(PlaybackCommand::Pause),
            "resume" => Ok(PlaybackCommand::Resume),
            "stop" => Ok(PlaybackCommand::Stop),
            "seek" => Ok(PlaybackCommand::Seek(number("seek")?)),
            "rate" | "speed" => Ok(PlaybackCommand::SetRate(number("rate")?)),
            "" => Err(PlaybackError::InvalidCommand("empty command".into())),
            other => Err(PlaybackError::InvalidCommand(format!("unknown command '{}'", other))),
        }
    }
}

/// Builds the components of a session starting at a media time.
///
/// Called once per session: on play from stopped and on every seek.
pub trait StageFactory: Send {
    fn open(&mut self, start: f64) -> Result<Stages, PlaybackError>;
}

impl<F> StageFactory for F
where
    F: FnMut(f64) -> Result<Stages, PlaybackError> + Send,
{
    fn open(&mut self, start: f64) -> Result<Stages, PlaybackError> {
        self(start)
    }
}

/// Main playback engine
pub struct PlaybackEngine {
    config: PlayerConfig,
    factory: Box<dyn StageFactory>,
    clock: Arc<MasterClock>,
    state: PlaybackState,
    session: Option<Session>,
    session_count: u64,
    start_position: f64,
    duration: Option<f64>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    last_metrics: Option<MetricsSnapshot>,
}

impl PlaybackEngine {
    /// Create an engine. Nothing runs until [`PlaybackEngine::play`].
    pub fn new(
        config: PlayerConfig,
        factory: impl StageFactory + 'static,
    ) -> Result<Self, PlaybackError> {
        config.validate()?;
        let clock = Arc::new(MasterClock::new(config.clock_tick()));
        clock.set_time_speed(config.clock.rate)?;
        let (events_tx, events_rx) = channel::unbounded();

        Ok(Self {
            config,
            factory: Box::new(factory),
            clock,
            state: PlaybackState::Stopped,
            session: None,
            session_count: 0,
            start_position: 0.0,
            duration: None,
            events_tx,
            events_rx,
            last_metrics: None,
        })
    }

    /// Process a playback command
    pub fn process_command(&mut self, command: PlaybackCommand) -> Result<(), PlaybackError> {
        debug!(?command, state = %self.state, "processing command");
        match command {
            PlaybackCommand::Play => self.play(),
            PlaybackCommand::Pause => {
                self.pause();
                Ok(())
            }
            PlaybackCommand::Resume => {
                self.resume();
                Ok(())
            }
            PlaybackCommand::Stop => {
                self.stop();
                Ok(())
            }
            PlaybackCommand::Seek(position) => self.seek(position),
            PlaybackCommand::SetRate(rate) => self.set_rate(rate),
        }
    }

    /// Start a session from the pending start position, or resume if paused.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            PlaybackState::Playing { .. } => Ok(()),
            PlaybackState::Paused { .. } => {
                self.resume();
                Ok(())
            }
            PlaybackState::Stopped => {
                let from = self.start_position;
                self.start_session(from, false)?;
                if let Err(e) = self.clock.start() {
                    self.end_session();
                    return Err(e.into());
                }
                self.state = PlaybackState::Playing { from };
                info!(from, "playback started");
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) {
        if !self.state.is_playing() {
            return;
        }
        if let Some(session) = &self.session {
            session.pause();
        }
        self.clock.pause();
        let position = self.clock.current_time();
        self.state = PlaybackState::Paused { position };
        info!(position, "playback paused");
    }

    pub fn resume(&mut self) {
        let PlaybackState::Paused { position } = self.state else {
            return;
        };
        self.clock.resume();
        if let Some(session) = &self.session {
            session.resume();
        }
        self.state = PlaybackState::Playing { from: position };
        info!(position, "playback resumed");
    }

    /// Reposition to `position` seconds (clamped to the known duration).
    ///
    /// A running or paused session is replaced by one starting at the
    /// target; the run state is preserved. While stopped, the target becomes
    /// the start of the next play.
    pub fn seek(&mut self, position: f64) -> Result<(), PlaybackError> {
        if !(position.is_finite() && position >= 0.0) {
            return Err(PlaybackError::InvalidSeek(position));
        }
        let target = self.duration.map_or(position, |d| position.min(d));
        let previous = self.state;

        self.end_session();
        self.clock.seek_to(target);
        self.start_position = target;

        let paused = match previous {
            PlaybackState::Stopped => {
                info!(target, "seek recorded for next play");
                return Ok(());
            }
            PlaybackState::Playing { .. } => false,
            PlaybackState::Paused { .. } => true,
        };

        if let Err(e) = self.start_session(target, paused) {
            self.clock.stop();
            self.state = PlaybackState::Stopped;
            return Err(e);
        }
        self.state = if paused {
            PlaybackState::Paused { position: target }
        } else {
            PlaybackState::Playing { from: target }
        };
        info!(target, "seek complete");
        Ok(())
    }

    /// End the session, stop the clock, and rewind to zero.
    pub fn stop(&mut self) {
        self.end_session();
        self.clock.stop();
        self.clock.seek_to(0.0);
        self.start_position = 0.0;
        if !self.state.is_stopped() {
            info!("playback stopped");
        }
        self.state = PlaybackState::Stopped;
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<(), PlaybackError> {
        self.clock.set_time_speed(rate)?;
        Ok(())
    }

    /// Master clock position in seconds.
    pub fn position(&self) -> f64 {
        self.clock.current_time()
    }

    /// Media duration, once a source has reported one.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn rate(&self) -> f64 {
        self.clock.time_speed()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Counters of the most recently ended session.
    pub fn last_metrics(&self) -> Option<&MetricsSnapshot> {
        self.last_metrics.as_ref()
    }

    /// Counters of the running session so far.
    pub fn live_metrics(&self) -> Option<MetricsSnapshot> {
        self.session.as_ref().map(|s| s.context().metrics_snapshot())
    }

    /// Receiver for session lifecycle events, to select on alongside input.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// Apply a session event. Returns true when it marks the end of playback.
    ///
    /// Events from sessions that were already replaced are ignored.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::StageExited { session, stage } => {
                debug!(session, stage, "stage exited");
                false
            }
            SessionEvent::Completed { session } => {
                if self.session.as_ref().map(Session::id) != Some(session) {
                    debug!(session, "ignoring completion of a replaced session");
                    return false;
                }
                if let Some(finished) = self.session.take() {
                    let snapshot = finished.wait();
                    info!(%snapshot, "playback finished");
                    self.last_metrics = Some(snapshot);
                }
                self.clock.stop();
                self.start_position = 0.0;
                self.state = PlaybackState::Stopped;
                true
            }
        }
    }

    /// Block until the current session plays to its end.
    ///
    /// Returns the final counters, or `None` if nothing was running.
    pub fn wait(&mut self) -> Option<MetricsSnapshot> {
        self.session.as_ref()?;
        while self.session.is_some() {
            match self.events_rx.recv() {
                Ok(event) => {
                    self.handle_event(event);
                }
                Err(_) => break,
            }
        }
        self.last_metrics.clone()
    }

    fn start_session(&mut self, start: f64, paused: bool) -> Result<(), PlaybackError> {
        let stages = self.factory.open(start)?;
        if self.duration.is_none() {
            self.duration = stages.source.duration();
        }

        self.session_count += 1;
        let ctx = SessionContext::new(&self.config, Arc::clone(&self.clock), start);
        if paused {
            ctx.playing.pause();
        }
        self.clock.seek_to(start);

        let session = Session::start(
            self.session_count,
            ctx,
            stages,
            Some(self.events_tx.clone()),
        )?;
        self.session = Some(session);
        Ok(())
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            let snapshot = session.stop();
            info!(%snapshot, "session ended");
            self.last_metrics = Some(snapshot);
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("engine dropped during playback, stopping");
        }
        self.end_session();
        self.clock.stop();
    }
}
