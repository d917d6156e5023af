//! Cooperative cancellation and pause signal shared by a session's stages.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Playing,
    Paused,
    Stopped,
}

/// Play/pause/stop flag with waits that wake as soon as it changes.
///
/// Stages poll [`PlayFlag::is_playing`] between units and do all their
/// timed waiting through [`PlayFlag::sleep`], so a stop request interrupts
/// a drift-correction sleep instead of waiting it out.
#[derive(Debug)]
pub struct PlayFlag {
    state: Mutex<Transport>,
    changed: Condvar,
}

impl PlayFlag {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Transport::Playing),
            changed: Condvar::new(),
        }
    }

    /// True until [`PlayFlag::stop`] is called (paused counts as playing).
    pub fn is_playing(&self) -> bool {
        *self.state.lock() != Transport::Stopped
    }

    pub fn is_paused(&self) -> bool {
        *self.state.lock() == Transport::Paused
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        if *state == Transport::Playing {
            *state = Transport::Paused;
            self.changed.notify_all();
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        if *state == Transport::Paused {
            *state = Transport::Playing;
            self.changed.notify_all();
        }
    }

    /// Clear the flag for good and wake every waiter.
    pub fn stop(&self) {
        *self.state.lock() = Transport::Stopped;
        self.changed.notify_all();
    }

    /// Block while paused. Returns false if stopped.
    pub fn wait_while_paused(&self) -> bool {
        let mut state = self.state.lock();
        while *state == Transport::Paused {
            self.changed.wait(&mut state);
        }
        *state != Transport::Stopped
    }

    /// Sleep for `duration` unless stopped first. Returns false if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut state = self.state.lock();
        match Instant::now().checked_add(duration) {
            Some(deadline) => {
                while *state != Transport::Stopped {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while *state != Transport::Stopped {
                    self.changed.wait(&mut state);
                }
            }
        }
        *state != Transport::Stopped
    }
}

impl Default for PlayFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sleep_runs_full_duration() {
        let flag = PlayFlag::new();
        let start = Instant::now();
        assert!(flag.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let flag = Arc::new(PlayFlag::new());
        let sleeper = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                let start = Instant::now();
                let completed = flag.sleep(Duration::from_secs(10));
                (completed, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        flag.stop();
        let (completed, elapsed) = sleeper.join().unwrap_or((true, Duration::MAX));
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_pause_blocks_until_resume() {
        let flag = Arc::new(PlayFlag::new());
        flag.pause();
        assert!(flag.is_paused());
        assert!(flag.is_playing());

        let waiter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || flag.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(20));
        flag.resume();
        assert_eq!(waiter.join().ok(), Some(true));
    }

    #[test]
    fn test_stop_releases_paused_waiter() {
        let flag = Arc::new(PlayFlag::new());
        flag.pause();
        let waiter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || flag.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(20));
        flag.stop();
        assert_eq!(waiter.join().ok(), Some(false));
        assert!(!flag.is_playing());
        // Stopped is terminal
        flag.resume();
        assert!(!flag.is_playing());
    }
}
