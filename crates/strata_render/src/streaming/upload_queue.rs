//! # Upload Queue
//!
//! Global priority queue of mip upload tasks: coarsest level first, FIFO
//! among equal levels. A texture has at most one task queued or running at
//! any time; the next level is queued only when the previous one finishes,
//! which is what keeps a texture's mips strictly coarse-to-fine.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::streaming::handle::TextureId;

/// Upload one mip level of one texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UploadTask {
    /// Target texture.
    pub texture: TextureId,
    /// Mip level to upload.
    pub mip_level: u32,
}

#[derive(Debug, PartialEq, Eq)]
struct Queued {
    task: UploadTask,
    seq: u64,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: coarser level wins, then the earlier sequence number.
        self.task
            .mip_level
            .cmp(&other.task.mip_level)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    running: usize,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.heap.is_empty() && self.running == 0
    }
}

/// Blocking priority queue shared by the manager and the upload workers.
#[derive(Debug, Default)]
pub struct UploadQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    idle: Condvar,
}

impl UploadQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task. Ignored after `close`.
    pub fn push(&self, task: UploadTask) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued { task, seq });
        drop(state);
        self.ready.notify_one();
    }

    /// Waits for the highest-priority task. Returns `None` once closed.
    ///
    /// Every task returned must be passed back to [`UploadQueue::finish`].
    pub fn pop(&self) -> Option<UploadTask> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(queued) = state.heap.pop() {
                state.running += 1;
                return Some(queued.task);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Takes the highest-priority task without waiting.
    pub fn try_pop(&self) -> Option<UploadTask> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let queued = state.heap.pop()?;
        state.running += 1;
        Some(queued.task)
    }

    /// Marks a popped task done, queueing `next` (the following mip) if any.
    pub fn finish(&self, next: Option<UploadTask>) {
        let mut state = self.state.lock();
        state.running = state.running.saturating_sub(1);
        if let Some(task) = next {
            if !state.closed {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.heap.push(Queued { task, seq });
                self.ready.notify_one();
            }
        }
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    /// Drops queued tasks for `texture`. Returns how many were removed.
    pub fn cancel(&self, texture: TextureId) -> usize {
        let mut state = self.state.lock();
        let before = state.heap.len();
        state.heap.retain(|queued| queued.task.texture != texture);
        let removed = before - state.heap.len();
        if state.is_idle() {
            self.idle.notify_all();
        }
        removed
    }

    /// Stops the queue: waiters wake, `pop` returns `None`, queued tasks are dropped.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.heap.clear();
        drop(state);
        self.ready.notify_all();
        self.idle.notify_all();
    }

    /// Queued (not running) tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Whether no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Tasks popped and not yet finished.
    #[must_use]
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Waits until nothing is queued or running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_idle() {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }
}
