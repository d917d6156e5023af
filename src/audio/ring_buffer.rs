//! Fixed-capacity byte ring between the audio decoder and the audio output.
//!
//! Writes never block: whatever does not fit is dropped and counted, since
//! a stalled audio decoder hurts more than a lost chunk. Reads block until
//! data arrives or the writer marks the stream finished.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

struct RingState {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    size: usize,
    finished: bool,
}

/// Byte-granular circular buffer of interleaved PCM.
///
/// Invariants: `0 <= size <= capacity`, bytes come out in write order, and
/// every accepted byte is read at most once.
pub struct SampleRingBuffer {
    state: Mutex<RingState>,
    capacity: usize,
    data_available: Condvar,
    space_available: Condvar,
    dropped: AtomicU64,
    written: AtomicU64,
}

impl SampleRingBuffer {
    /// Allocate a ring of `capacity` bytes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity].into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
                size: 0,
                finished: false,
            }),
            capacity,
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            dropped: AtomicU64::new(0),
            written: AtomicU64::new(0),
        }
    }

    /// Copy as much of `data` as fits; the rest is discarded.
    ///
    /// Returns the number of bytes accepted.
    pub fn write(&self, data: &[u8]) -> usize {
        self.write_aligned(data, 1)
    }

    /// Like [`write`](Self::write), but truncates to a multiple of
    /// `frame_bytes` so a partial write never splits a sample frame.
    pub fn write_aligned(&self, data: &[u8], frame_bytes: usize) -> usize {
        if data.is_empty() {
            return 0;
        }
        let frame_bytes = frame_bytes.max(1);

        let accepted = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut accepted = data.len().min(self.capacity - state.size);
            if accepted < data.len() {
                accepted -= accepted % frame_bytes;
            }

            let first = accepted.min(self.capacity - state.write_pos);
            state.buf[state.write_pos..state.write_pos + first].copy_from_slice(&data[..first]);
            state.buf[..accepted - first].copy_from_slice(&data[first..accepted]);

            state.write_pos = (state.write_pos + accepted) % self.capacity;
            state.size += accepted;
            self.data_available.notify_all();
            accepted
        };

        self.written.fetch_add(accepted as u64, Ordering::Relaxed);
        let dropped = data.len() - accepted;
        if dropped > 0 {
            self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            warn!(dropped, accepted, "audio ring full, truncating write");
        }
        accepted
    }

    /// Block until at least `bytes` (capped at capacity) are free, or the
    /// ring is finished. Returns false if it was finished.
    pub fn wait_for_space(&self, bytes: usize) -> bool {
        let wanted = bytes.min(self.capacity);
        let mut state = self.state.lock();
        while self.capacity - state.size < wanted && !state.finished {
            self.space_available.wait(&mut state);
        }
        !state.finished
    }

    /// Copy up to `out.len()` bytes out, blocking while the ring is empty
    /// and not finished.
    ///
    /// Returns 0 only once the ring is finished and drained (or `out` is empty).
    pub fn read(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }

        let mut guard = self.state.lock();
        while guard.size == 0 && !guard.finished {
            self.data_available.wait(&mut guard);
        }

        let state = &mut *guard;
        let count = out.len().min(state.size);
        let first = count.min(self.capacity - state.read_pos);
        out[..first].copy_from_slice(&state.buf[state.read_pos..state.read_pos + first]);
        out[first..count].copy_from_slice(&state.buf[..count - first]);

        state.read_pos = (state.read_pos + count) % self.capacity;
        state.size -= count;
        if count > 0 {
            self.space_available.notify_all();
        }
        count
    }

    /// Mark (or unmark) end of stream, waking blocked readers and writers.
    pub fn set_finished(&self, finished: bool) {
        let mut state = self.state.lock();
        state.finished = finished;
        self.data_available.notify_all();
        self.space_available.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard buffered bytes without touching the finished flag.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let released = state.size;
        state.read_pos = 0;
        state.write_pos = 0;
        state.size = 0;
        self.space_available.notify_all();
        debug!(released, "audio ring cleared");
        released
    }

    /// Total bytes discarded by truncating writes.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total bytes accepted by writes.
    pub fn total_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_then_read() {
        let ring = SampleRingBuffer::new(16);
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_truncating_write() {
        let ring = SampleRingBuffer::new(6);
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        assert_eq!(ring.write(&[5, 6, 7, 8]), 2);
        assert_eq!(ring.len(), 6);
        assert_eq!(ring.dropped_bytes(), 2);
        assert_eq!(ring.total_written(), 6);

        let mut out = [0u8; 6];
        assert_eq!(ring.read(&mut out), 6);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_aligned_write_truncates_on_frame_boundary() {
        let ring = SampleRingBuffer::new(10);
        assert_eq!(ring.write_aligned(&[1; 4], 4), 4);
        // 6 bytes free: only one whole 4-byte frame fits
        assert_eq!(ring.write_aligned(&[2; 8], 4), 4);
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.dropped_bytes(), 4);
        assert_eq!(ring.write_aligned(&[3; 4], 4), 0);
        assert_eq!(ring.dropped_bytes(), 8);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let ring = SampleRingBuffer::new(5);
        let mut out = [0u8; 3];
        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_eq!(ring.read(&mut out), 3);
        // write_pos is now 3, this write wraps
        assert_eq!(ring.write(&[4, 5, 6, 7]), 4);
        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [4, 5, 6, 7]);
    }

    #[test]
    fn test_byte_conservation() {
        let ring = SampleRingBuffer::new(7);
        let mut expected = Vec::new();
        let mut received = Vec::new();
        let mut next = 0u8;
        let mut out = [0u8; 3];

        for round in 0..50 {
            let chunk: Vec<u8> = (0..(round % 5))
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            let accepted = ring.write(&chunk);
            expected.extend_from_slice(&chunk[..accepted]);
            if !ring.is_empty() {
                let n = ring.read(&mut out);
                received.extend_from_slice(&out[..n]);
            }
        }
        ring.set_finished(true);
        loop {
            let n = ring.read(&mut out);
            if n == 0 {
                break;
            }
            received.extend_from_slice(&out[..n]);
        }
        assert_eq!(received, expected);
        assert_eq!(ring.total_written(), expected.len() as u64);
    }

    #[test]
    fn test_read_blocks_until_write() {
        let ring = Arc::new(SampleRingBuffer::new(32));
        let reader = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut out = [0u8; 8];
                let n = ring.read(&mut out);
                out[..n].to_vec()
            })
        };
        thread::sleep(Duration::from_millis(30));
        ring.write(&[9, 8, 7]);
        assert_eq!(reader.join().ok(), Some(vec![9, 8, 7]));
    }

    #[test]
    fn test_finished_and_empty_returns_zero() {
        let ring = Arc::new(SampleRingBuffer::new(32));
        let reader = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut out = [0u8; 8];
                ring.read(&mut out)
            })
        };
        thread::sleep(Duration::from_millis(30));
        ring.set_finished(true);
        assert_eq!(reader.join().ok(), Some(0));
    }

    #[test]
    fn test_finished_ring_still_drains() {
        let ring = SampleRingBuffer::new(8);
        ring.write(&[1, 2]);
        ring.set_finished(true);
        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn test_wait_for_space() {
        let ring = Arc::new(SampleRingBuffer::new(4));
        ring.write(&[1, 2, 3, 4]);
        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.wait_for_space(2))
        };
        thread::sleep(Duration::from_millis(30));
        let mut out = [0u8; 2];
        ring.read(&mut out);
        assert_eq!(writer.join().ok(), Some(true));

        // Requests larger than the ring are capped at capacity
        ring.clear();
        assert!(ring.wait_for_space(100));

        ring.write(&[1, 2, 3, 4]);
        ring.set_finished(true);
        assert!(!ring.wait_for_space(1));
    }

    #[test]
    fn test_clear() {
        let ring = SampleRingBuffer::new(8);
        ring.write(&[1, 2, 3]);
        assert_eq!(ring.clear(), 3);
        assert!(ring.is_empty());
        assert_eq!(ring.write(&[0; 8]), 8);
    }
}
