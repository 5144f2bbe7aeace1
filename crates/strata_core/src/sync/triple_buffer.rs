//! # Triple-Buffered Snapshot Handoff
//!
//! Non-blocking producer/consumer exchange of whole-frame snapshots.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to hand out `&mut T` to two threads at once
//! (one per slot). Every unsafe block relies on the role invariant checked
//! under the role lock: the write slot, the pending slot and the read slot are
//! always three distinct indices.

#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────────────────┐
//!                  │            TripleBuffer<T>           │
//!                  │  ┌────────┐  ┌────────┐  ┌────────┐  │
//!                  │  │ slot 0 │  │ slot 1 │  │ slot 2 │  │
//!                  │  └────────┘  └────────┘  └────────┘  │
//!                  │     Roles { write, pending, read }    │
//!                  └──────────────────────────────────────┘
//!                        ▲                        ▲
//!     commit_write():    │                        │   start_read():
//!     write <-> pending  │                        │   read <-> pending
//!                        │                        │   (only if fresh)
//!             ┌──────────┴─────────┐   ┌──────────┴─────────┐
//!             │ TripleBufferWriter │   │ TripleBufferReader │
//!             │    (extraction)    │   │    (GPU thread)    │
//!             └────────────────────┘   └────────────────────┘
//! ```
//!
//! The role lock is held only while indices are swapped, never while a
//! snapshot is being written or read. The "display" role of the frame
//! pipeline is the `read` slot: the one currently owned by the consumer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Role of a slot at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotRole {
    /// Exclusively owned by the producer.
    Write,
    /// Last committed snapshot, not yet picked up by the consumer.
    Pending,
    /// Exclusively owned by the consumer (being read / displayed).
    Read,
}

/// Point-in-time copy of the role assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleSnapshot {
    /// Slot index holding the write role.
    pub write: usize,
    /// Slot index holding the pending role.
    pub pending: usize,
    /// Slot index holding the read role.
    pub read: usize,
    /// Whether the pending slot carries a commit the consumer has not seen.
    pub fresh: bool,
}

impl RoleSnapshot {
    /// Returns the role of `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not 0, 1 or 2.
    #[must_use]
    pub fn role_of(&self, slot: usize) -> SlotRole {
        if slot == self.write {
            SlotRole::Write
        } else if slot == self.pending {
            SlotRole::Pending
        } else if slot == self.read {
            SlotRole::Read
        } else {
            panic!("slot {slot} out of range for a triple buffer");
        }
    }

    /// Returns true if every role is held by a distinct slot.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.write != self.pending && self.write != self.read && self.pending != self.read
    }
}

struct Roles {
    write: usize,
    pending: usize,
    read: usize,
    fresh: bool,
}

impl Roles {
    fn snapshot(&self) -> RoleSnapshot {
        RoleSnapshot {
            write: self.write,
            pending: self.pending,
            read: self.read,
            fresh: self.fresh,
        }
    }

    fn assert_distinct(&self) {
        assert!(
            self.snapshot().is_consistent(),
            "Triple buffer role aliasing: write={}, pending={}, read={}",
            self.write,
            self.pending,
            self.read
        );
    }
}

/// Three snapshot slots rotating through write / pending / read roles.
///
/// Created with [`TripleBuffer::new`] or [`TripleBuffer::from_slots`], which
/// return the only writer and the only reader. Neither handle is `Clone`, so
/// exactly one producer can hold the write role.
///
/// ## Usage
///
/// ```rust,ignore
/// let (mut writer, mut reader) = TripleBuffer::new(FrameData::default());
///
/// // Extraction thread
/// writer.current_write_state().camera = camera;
/// writer.commit_write();
///
/// // GPU thread
/// let frame = reader.start_read();
/// submit(frame);
/// let was_new = reader.stop_read();
/// ```
pub struct TripleBuffer<T> {
    /// Slot storage. Access is partitioned by `roles`.
    slots: [UnsafeCell<T>; 3],
    /// Role assignment. Held only while indices are swapped.
    roles: Mutex<Roles>,
    /// Number of commits since creation.
    generation: AtomicU64,
}

// SAFETY: the writer and the reader only ever touch distinct slots (role
// invariant, asserted on every swap), so sharing the buffer between two
// threads only moves `T` values across threads.
unsafe impl<T: Send> Send for TripleBuffer<T> {}
// SAFETY: see above; no slot is reachable from two handles at once.
unsafe impl<T: Send> Sync for TripleBuffer<T> {}

impl<T: Clone> TripleBuffer<T> {
    /// Creates a triple buffer with every slot initialised to `initial`.
    #[must_use]
    pub fn new(initial: T) -> (TripleBufferWriter<T>, TripleBufferReader<T>) {
        Self::from_slots([initial.clone(), initial.clone(), initial])
    }
}

impl<T> TripleBuffer<T> {
    /// Creates a triple buffer from three explicit slot values.
    ///
    /// Slot 0 starts as the write slot, slot 1 as pending and slot 2 as read.
    #[must_use]
    pub fn from_slots(slots: [T; 3]) -> (TripleBufferWriter<T>, TripleBufferReader<T>) {
        let [a, b, c] = slots;
        let buffer = Arc::new(Self {
            slots: [UnsafeCell::new(a), UnsafeCell::new(b), UnsafeCell::new(c)],
            roles: Mutex::new(Roles {
                write: 0,
                pending: 1,
                read: 2,
                fresh: false,
            }),
            generation: AtomicU64::new(0),
        });

        let writer = TripleBufferWriter {
            buffer: Arc::clone(&buffer),
            index: 0,
        };
        let reader = TripleBufferReader {
            buffer,
            index: 2,
            consumed_new: false,
        };
        (writer, reader)
    }

    /// Returns the number of commits since creation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the current role assignment.
    #[must_use]
    pub fn roles(&self) -> RoleSnapshot {
        self.roles.lock().snapshot()
    }

    /// Returns true if a commit is waiting for the consumer.
    #[must_use]
    pub fn has_fresh_commit(&self) -> bool {
        self.roles.lock().fresh
    }
}

/// Producer side of a [`TripleBuffer`].
pub struct TripleBufferWriter<T> {
    buffer: Arc<TripleBuffer<T>>,
    /// Cached write slot. Only `commit_write` moves the write role.
    index: usize,
}

impl<T> TripleBufferWriter<T> {
    /// Returns the slot the producer is filling.
    ///
    /// After a commit this slot holds an older snapshot (two commits back,
    /// or one already consumed); producers are expected to overwrite it.
    #[inline]
    pub fn current_write_state(&mut self) -> &mut T {
        // SAFETY: `index` holds the write role. The role only moves inside
        // `commit_write`, which needs `&mut self`, and the reader never
        // touches the write slot.
        unsafe { &mut *self.buffer.slots[self.index].get() }
    }

    /// Publishes the write slot and takes over the previously pending one.
    ///
    /// Latest-wins: a pending snapshot that was never read is recycled as the
    /// next write slot and its contents are dropped from the handoff.
    ///
    /// Returns the new generation.
    ///
    /// # Panics
    ///
    /// Panics if the role invariant is violated.
    pub fn commit_write(&mut self) -> u64 {
        {
            let mut guard = self.buffer.roles.lock();
            let roles = &mut *guard;
            assert_eq!(roles.write, self.index, "Triple buffer write role moved under the writer");
            std::mem::swap(&mut roles.write, &mut roles.pending);
            roles.fresh = true;
            roles.assert_distinct();
            self.index = roles.write;
        }
        self.buffer.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the slot index holding the write role (for debugging).
    #[inline]
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.index
    }

    /// Returns the shared buffer.
    #[must_use]
    pub fn buffer(&self) -> &TripleBuffer<T> {
        &self.buffer
    }
}

/// Consumer side of a [`TripleBuffer`].
pub struct TripleBufferReader<T> {
    buffer: Arc<TripleBuffer<T>>,
    /// Cached read slot. Only `start_read` moves the read role.
    index: usize,
    /// Set when `start_read` picked up a fresh commit; cleared by `stop_read`.
    consumed_new: bool,
}

impl<T> TripleBufferReader<T> {
    /// Selects the most recently committed snapshot and returns it.
    ///
    /// If nothing was committed since the previous call the current read slot
    /// is returned again.
    ///
    /// # Panics
    ///
    /// Panics if the role invariant is violated.
    pub fn start_read(&mut self) -> &mut T {
        {
            let mut guard = self.buffer.roles.lock();
            let roles = &mut *guard;
            if roles.fresh {
                std::mem::swap(&mut roles.read, &mut roles.pending);
                roles.fresh = false;
                self.consumed_new = true;
            }
            roles.assert_distinct();
            self.index = roles.read;
        }
        self.current_read_state_mut()
    }

    /// Ends the current read.
    ///
    /// Returns true iff the read that just ended consumed a commit that had
    /// not been seen before. Repeated calls without an intervening commit
    /// return false.
    pub fn stop_read(&mut self) -> bool {
        std::mem::take(&mut self.consumed_new)
    }

    /// Returns the snapshot selected by the last `start_read`.
    #[inline]
    #[must_use]
    pub fn current_read_state(&self) -> &T {
        // SAFETY: `index` holds the read role, which only moves inside
        // `start_read` (`&mut self`). The writer never touches it.
        unsafe { &*self.buffer.slots[self.index].get() }
    }

    /// Mutable access to the read slot, for attaching submission metadata.
    #[inline]
    pub fn current_read_state_mut(&mut self) -> &mut T {
        // SAFETY: as in `current_read_state`, and `&mut self` guarantees no
        // other borrow of this slot through the reader.
        unsafe { &mut *self.buffer.slots[self.index].get() }
    }

    /// Returns the slot index holding the read role (for debugging).
    #[inline]
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.index
    }

    /// Returns the shared buffer.
    #[must_use]
    pub fn buffer(&self) -> &TripleBuffer<T> {
        &self.buffer
    }
}
