pub mod clock;
pub mod engine;
pub mod flag;
pub mod metrics;
pub mod session;
pub mod state;
pub mod sync;

pub use clock::{ClockError, ClockState, MasterClock};
pub use engine::{PlaybackCommand, PlaybackEngine, PlaybackError, StageFactory};
pub use flag::PlayFlag;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use session::{AudioStages, Session, SessionContext, SessionEvent, Stages, VideoStages};
pub use state::PlaybackState;
