//! # STRATA Core
//!
//! GPU-agnostic primitives for the STRATA frame pipeline:
//! - Triple-buffered handoff of render snapshots between extraction and GPU threads
//! - Keyed free-lists for O(1) reuse of recycled storage
//!
//! ## Architecture Rules
//!
//! 1. **The producer never blocks on the consumer** - commits are latest-wins
//! 2. **Locks guard roles, not contents** - no lock is held while a snapshot is read or written
//! 3. **Invariant violations fail fast** - role aliasing is an assertion, not an error value
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::TripleBuffer;
//!
//! let (mut writer, mut reader) = TripleBuffer::new(0u64);
//! *writer.current_write_state() = 42;
//! writer.commit_write();
//! assert_eq!(*reader.start_read(), 42);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod memory;
pub mod sync;

pub use memory::KeyedFreeList;
pub use sync::{RoleSnapshot, SlotRole, TripleBuffer, TripleBufferReader, TripleBufferWriter};
