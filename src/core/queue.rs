//! Blocking FIFO hand-off between pipeline stages.
//!
//! A [`UnitQueue`] carries coded packets (demuxer to decoder) or decoded
//! frames (decoder to presenter). Consumers block until a unit arrives or
//! the producer marks the stream finished; bounded queues also block the
//! producer while full, which is what keeps a fast demuxer from buffering
//! a whole file into memory.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::core::packet::Packet;

/// Queue of coded packets between the source and one decoder.
pub type PacketQueue = UnitQueue<Packet>;

struct QueueState<T> {
    units: VecDeque<T>,
    finished: bool,
}

/// Thread-safe FIFO with end-of-stream signalling.
///
/// Invariants:
/// - units come out in push order, each exactly once
/// - `pop` returns `None` only once the queue is finished *and* drained
/// - after `set_finished(true)` every push is rejected and handed back
pub struct UnitQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    unit_available: Condvar,
    space_available: Condvar,
}

impl<T> UnitQueue<T> {
    /// Queue that holds at most `capacity` units (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    /// Queue with no upper bound; pushes never block.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                units: VecDeque::new(),
                finished: false,
            }),
            capacity,
            unit_available: Condvar::new(),
            space_available: Condvar::new(),
        }
    }

    /// Append a unit, blocking while a bounded queue is full.
    ///
    /// Returns the unit back as `Err` if the queue is (or becomes, while
    /// waiting for space) finished.
    pub fn push(&self, unit: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if let Some(capacity) = self.capacity {
            while state.units.len() >= capacity && !state.finished {
                self.space_available.wait(&mut state);
            }
        }
        if state.finished {
            trace!("push rejected, queue finished");
            return Err(unit);
        }
        state.units.push_back(unit);
        self.unit_available.notify_one();
        Ok(())
    }

    /// Take the oldest unit, blocking until one is available.
    ///
    /// Returns `None` once the queue is finished and empty.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.units.is_empty() && !state.finished {
            self.unit_available.wait(&mut state);
        }
        let unit = state.units.pop_front();
        if unit.is_some() && self.capacity.is_some() {
            self.space_available.notify_one();
        }
        unit
    }

    /// Take the oldest unit if there is one, without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let unit = state.units.pop_front();
        if unit.is_some() && self.capacity.is_some() {
            self.space_available.notify_one();
        }
        unit
    }

    /// Mark (or unmark) end of stream and wake every waiter on both sides.
    pub fn set_finished(&self, finished: bool) {
        let mut state = self.state.lock();
        state.finished = finished;
        self.unit_available.notify_all();
        self.space_available.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().units.len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Drop every queued unit and return how many were released.
    pub fn clear(&self) -> usize {
        let drained = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.units)
        };
        self.space_available.notify_all();
        drained.len()
    }

    /// Clear and reopen the queue for a new stream.
    pub fn reset(&self) -> usize {
        let released = self.clear();
        self.state.lock().finished = false;
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::MediaKind;
    use crate::core::time::TimeBase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn packet(pts: i64) -> Packet {
        Packet::new(MediaKind::Video, vec![pts as u8], TimeBase::MPEG).with_pts(pts)
    }

    #[test]
    fn test_fifo_order() {
        let queue = UnitQueue::unbounded();
        for i in 0..5 {
            assert!(queue.push(i).is_ok());
        }
        let drained: Vec<i32> = (0..5).filter_map(|_| queue.try_pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_three_packets_then_finish() {
        let queue = PacketQueue::unbounded();
        for pts in [0, 3_000, 6_000] {
            assert!(queue.push(packet(pts)).is_ok());
        }
        queue.set_finished(true);

        let popped: Vec<i64> = std::iter::from_fn(|| queue.pop())
            .filter_map(|p| p.pts)
            .collect();
        assert_eq!(popped, vec![0, 3_000, 6_000]);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_after_finish_is_rejected() {
        let queue = UnitQueue::unbounded();
        queue.set_finished(true);
        assert_eq!(queue.push(7), Err(7));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(UnitQueue::unbounded());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(30));
        assert!(queue.push(42).is_ok());
        assert_eq!(consumer.join().ok().flatten(), Some(42));
    }

    #[test]
    fn test_finish_wakes_all_consumers() {
        let queue: Arc<UnitQueue<u32>> = Arc::new(UnitQueue::unbounded());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();
        thread::sleep(Duration::from_millis(30));
        queue.set_finished(true);
        for consumer in consumers {
            assert_eq!(consumer.join().ok().flatten(), None);
        }
    }

    #[test]
    fn test_bounded_push_blocks_until_pop() {
        let queue = Arc::new(UnitQueue::bounded(2));
        assert!(queue.push(1).is_ok());
        assert!(queue.push(2).is_ok());

        let pushed = Arc::new(AtomicUsize::new(0));
        let producer = {
            let queue = Arc::clone(&queue);
            let pushed = Arc::clone(&pushed);
            thread::spawn(move || {
                let result = queue.push(3);
                pushed.store(1, Ordering::SeqCst);
                result
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(pushed.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), Some(1));
        assert!(matches!(producer.join(), Ok(Ok(()))));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn test_finish_releases_blocked_producer() {
        let queue = Arc::new(UnitQueue::bounded(1));
        assert!(queue.push(1).is_ok());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };
        thread::sleep(Duration::from_millis(30));
        queue.set_finished(true);
        assert!(matches!(producer.join(), Ok(Err(2))));
        // Already-queued units still drain
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_releases_units() {
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let queue = UnitQueue::bounded(8);
        for _ in 0..4 {
            assert!(queue.push(Tracked(Arc::clone(&dropped))).is_ok());
        }
        assert_eq!(queue.clear(), 4);
        assert_eq!(dropped.load(Ordering::SeqCst), 4);
        assert!(queue.is_empty());
        assert!(!queue.is_finished());
    }

    #[test]
    fn test_reset_reopens() {
        let queue = UnitQueue::bounded(4);
        assert!(queue.push(1).is_ok());
        queue.set_finished(true);
        assert_eq!(queue.reset(), 1);
        assert!(!queue.is_finished());
        assert!(queue.push(2).is_ok());
        assert_eq!(queue.capacity(), Some(4));
    }

    #[test]
    fn test_bounded_capacity_minimum() {
        let queue: UnitQueue<u8> = UnitQueue::bounded(0);
        assert_eq!(queue.capacity(), Some(1));
        assert_eq!(UnitQueue::<u8>::unbounded().capacity(), None);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = Arc::new(UnitQueue::bounded(4));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..200u32 {
                    if queue.push(i).is_err() {
                        break;
                    }
                }
                queue.set_finished(true);
            })
        };
        let received: Vec<u32> = std::iter::from_fn(|| queue.pop()).collect();
        assert!(producer.join().is_ok());
        assert_eq!(received, (0..200).collect::<Vec<_>>());
    }
}
