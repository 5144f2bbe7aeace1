//! # Transfer Buffer Pool
//!
//! A fixed set of staging buffers. Each buffer carries at most one upload
//! at a time: it is leased by a worker, filled, copied by the GPU thread,
//! and returned when the fence guarding that copy signals.
//!
//! ```text
//!   worker: acquire() ──► fill() ──► gpu.call(upload + fence(on_signaled = drop lease))
//!                                                              │
//!   pool  ◄──────────────── lease dropped, buffer free ◄───────┘
//! ```

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// One staging buffer.
#[derive(Debug)]
struct TransferBuffer {
    /// `None` while leased.
    storage: Option<Vec<u8>>,
    uploading: bool,
}

#[derive(Debug)]
struct TransferState {
    buffers: Vec<TransferBuffer>,
    in_flight: usize,
    peak_in_flight: usize,
    closed: bool,
}

#[derive(Debug)]
struct TransferInner {
    state: Mutex<TransferState>,
    available: Condvar,
    buffer_size: usize,
}

impl TransferInner {
    fn give_back(&self, index: usize, storage: Vec<u8>) {
        let mut state = self.state.lock();
        let buffer = &mut state.buffers[index];
        debug_assert!(buffer.uploading, "Staging buffer {index} returned twice");
        buffer.storage = Some(storage);
        buffer.uploading = false;
        state.in_flight -= 1;
        drop(state);
        self.available.notify_one();
    }
}

/// Shared handle to the staging buffers.
#[derive(Clone, Debug)]
pub struct TransferBufferPool {
    inner: Arc<TransferInner>,
}

impl TransferBufferPool {
    /// Creates `count` buffers of `buffer_size` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `count` or `buffer_size` is zero.
    #[must_use]
    pub fn new(count: usize, buffer_size: usize) -> Self {
        assert!(count > 0, "Need at least one staging buffer");
        assert!(buffer_size > 0, "Staging buffers must not be empty");
        let buffers = (0..count)
            .map(|_| TransferBuffer {
                storage: Some(vec![0; buffer_size]),
                uploading: false,
            })
            .collect();
        Self {
            inner: Arc::new(TransferInner {
                state: Mutex::new(TransferState {
                    buffers,
                    in_flight: 0,
                    peak_in_flight: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                buffer_size,
            }),
        }
    }

    /// Waits for a free buffer. Returns `None` once the pool is closed.
    pub fn acquire(&self) -> Option<TransferLease> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(lease) = self.take_free(&mut state) {
                return Some(lease);
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Takes a free buffer without waiting.
    pub fn try_acquire(&self) -> Option<TransferLease> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        self.take_free(&mut state)
    }

    fn take_free(&self, state: &mut TransferState) -> Option<TransferLease> {
        let index = state.buffers.iter().position(|b| !b.uploading)?;
        let buffer = &mut state.buffers[index];
        let storage = buffer.storage.take()?;
        buffer.uploading = true;
        state.in_flight += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        Some(TransferLease {
            index,
            storage: Some(storage),
            len: 0,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Wakes every waiter; later `acquire` calls return `None`.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_all();
    }

    /// Size of each buffer.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of buffers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.state.lock().buffers.len()
    }

    /// Buffers currently leased.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Most buffers leased at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.inner.state.lock().peak_in_flight
    }
}

/// Exclusive use of one staging buffer. Dropping it frees the buffer.
#[derive(Debug)]
pub struct TransferLease {
    index: usize,
    storage: Option<Vec<u8>>,
    len: usize,
    pool: Arc<TransferInner>,
}

impl TransferLease {
    /// Buffer index within the pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Copies `bytes` into the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is larger than the buffer.
    pub fn fill(&mut self, bytes: &[u8]) {
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        assert!(
            bytes.len() <= storage.len(),
            "Staging overflow: {} bytes into a {} byte buffer",
            bytes.len(),
            storage.len()
        );
        storage[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
    }

    /// The bytes written by the last `fill`.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match &self.storage {
            Some(storage) => &storage[..self.len],
            None => &[],
        }
    }
}

impl Drop for TransferLease {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.give_back(self.index, storage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lease_and_return() {
        let pool = TransferBufferPool::new(2, 16);
        let mut a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert_ne!(a.index(), b.index());
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.in_flight(), 2);

        a.fill(&[1, 2, 3]);
        assert_eq!(a.bytes(), &[1, 2, 3]);

        drop(a);
        assert_eq!(pool.in_flight(), 1);
        assert!(pool.try_acquire().is_some());
        assert_eq!(pool.peak_in_flight(), 2);
    }

    #[test]
    #[should_panic(expected = "Staging overflow")]
    fn test_overfill_panics() {
        let pool = TransferBufferPool::new(1, 4);
        let mut lease = pool.acquire().unwrap();
        lease.fill(&[0; 5]);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = TransferBufferPool::new(1, 4);
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|lease| lease.index()))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(pool.in_flight(), 1);
        drop(held);

        assert_eq!(waiter.join().unwrap(), Some(0));
    }

    #[test]
    fn test_close_wakes_waiters() {
        let pool = TransferBufferPool::new(1, 4);
        let _held = pool.acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        pool.close();
        assert!(waiter.join().unwrap());
    }
}
