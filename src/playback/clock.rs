//! Master playback clock.
//!
//! One clock is shared by every presentation stage. A dedicated `clock`
//! thread publishes `base_time + elapsed * speed` at a fixed tick into an
//! atomic, so readers never take a lock. Control operations (pause, resume,
//! seek, speed change) rebase the reference point under a mutex and wake
//! the driver through a condition variable.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

/// Default publishing interval of the driving thread
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Error type for clock control
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("Invalid time speed {0}: must be finite and greater than zero")]
    InvalidRate(f64),
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Run state of the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

struct Control {
    state: ClockState,
    /// Clock value at `reference`
    base_time: f64,
    reference: Instant,
    speed: f64,
}

impl Control {
    fn now_value(&self) -> f64 {
        self.base_time + self.reference.elapsed().as_secs_f64() * self.speed
    }
}

struct ClockShared {
    current: AtomicU64,
    control: Mutex<Control>,
    wake: Condvar,
}

impl ClockShared {
    fn publish(&self, seconds: f64) {
        self.current.store(seconds.to_bits(), Ordering::Release);
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Acquire))
    }
}

/// Process-wide playback position in seconds.
///
/// Between control operations the published value never decreases.
pub struct MasterClock {
    shared: Arc<ClockShared>,
    tick: Duration,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MasterClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                current: AtomicU64::new(0f64.to_bits()),
                control: Mutex::new(Control {
                    state: ClockState::Stopped,
                    base_time: 0.0,
                    reference: Instant::now(),
                    speed: 1.0,
                }),
                wake: Condvar::new(),
            }),
            tick: tick.max(Duration::from_millis(1)),
            driver: Mutex::new(None),
        }
    }

    /// Current clock value in seconds. Lock-free.
    pub fn current_time(&self) -> f64 {
        self.shared.load()
    }

    /// Start the driving thread from the current value. No-op unless stopped.
    pub fn start(&self) -> Result<(), ClockError> {
        let mut driver = self.driver.lock();
        {
            let mut control = self.shared.control.lock();
            if control.state != ClockState::Stopped {
                return Ok(());
            }
            control.base_time = self.shared.load();
            control.reference = Instant::now();
            control.state = ClockState::Running;
        }

        // A previous driver has already been told to exit
        if let Some(previous) = driver.take() {
            let _ = previous.join();
        }

        let shared = Arc::clone(&self.shared);
        let tick = self.tick;
        let spawned = thread::Builder::new()
            .name("clock".to_string())
            .spawn(move || drive(shared, tick));

        match spawned {
            Ok(handle) => {
                *driver = Some(handle);
                info!(at = self.current_time(), "clock started");
                Ok(())
            }
            Err(e) => {
                self.shared.control.lock().state = ClockState::Stopped;
                Err(ClockError::Spawn(e))
            }
        }
    }

    /// Freeze the clock at its present value. Idempotent.
    pub fn pause(&self) {
        let mut control = self.shared.control.lock();
        if control.state != ClockState::Running {
            return;
        }
        let now = control.now_value();
        control.base_time = now;
        control.state = ClockState::Paused;
        self.shared.publish(now);
        self.shared.wake.notify_all();
        debug!(at = now, "clock paused");
    }

    /// Continue from the frozen value. No-op unless paused.
    pub fn resume(&self) {
        let mut control = self.shared.control.lock();
        if control.state != ClockState::Paused {
            return;
        }
        control.reference = Instant::now();
        control.state = ClockState::Running;
        self.shared.publish(control.base_time);
        self.shared.wake.notify_all();
        debug!(at = control.base_time, "clock resumed");
    }

    /// Jump to `seconds`. The run state is unchanged.
    ///
    /// The clock does not know about queued units: callers repositioning
    /// playback must discard stale packets and frames themselves.
    pub fn seek_to(&self, seconds: f64) {
        let mut control = self.shared.control.lock();
        control.base_time = seconds;
        control.reference = Instant::now();
        self.shared.publish(seconds);
        self.shared.wake.notify_all();
        debug!(to = seconds, "clock repositioned");
    }

    /// Change the playback speed, rebasing so the value stays continuous.
    ///
    /// Non-positive or non-finite speeds are rejected and leave the clock
    /// untouched.
    pub fn set_time_speed(&self, speed: f64) -> Result<(), ClockError> {
        if !(speed.is_finite() && speed > 0.0) {
            warn!(speed, "rejecting invalid time speed");
            return Err(ClockError::InvalidRate(speed));
        }
        let mut control = self.shared.control.lock();
        if control.state == ClockState::Running {
            let now = control.now_value();
            control.base_time = now;
            control.reference = Instant::now();
            self.shared.publish(now);
        }
        control.speed = speed;
        self.shared.wake.notify_all();
        info!(speed, "time speed changed");
        Ok(())
    }

    pub fn time_speed(&self) -> f64 {
        self.shared.control.lock().speed
    }

    pub fn state(&self) -> ClockState {
        self.shared.control.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ClockState::Paused
    }

    /// Stop the driving thread and wait for it. The value is kept.
    pub fn stop(&self) {
        let mut driver = self.driver.lock();
        {
            let mut control = self.shared.control.lock();
            if control.state == ClockState::Running {
                let now = control.now_value();
                control.base_time = now;
                self.shared.publish(now);
            }
            control.state = ClockState::Stopped;
            self.shared.wake.notify_all();
        }
        if let Some(handle) = driver.take() {
            let _ = handle.join();
            debug!(at = self.current_time(), "clock stopped");
        }
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Drop for MasterClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drive(shared: Arc<ClockShared>, tick: Duration) {
    let mut control = shared.control.lock();
    loop {
        match control.state {
            ClockState::Stopped => break,
            ClockState::Paused => shared.wake.wait(&mut control),
            ClockState::Running => {
                shared.publish(control.now_value());
                shared.wake.wait_for(&mut control, tick);
            }
        }
    }
}
