//! Core types shared by every pipeline stage.
//!
//! Time bases and second conversions, coded packets, and the blocking
//! unit queue the stages hand work through.

pub mod packet;
pub mod queue;
pub mod time;

pub use packet::{MediaKind, Packet};
pub use queue::{PacketQueue, UnitQueue};
pub use time::{duration_from_seconds, format_time, TimeBase};
