//! # Synchronization Primitives for the Frame Pipeline
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Extraction):   WRITE next frame's render state
//! Thread 2 (GPU):          READ the last complete render state
//!
//! Without synchronization: torn snapshots
//! With a Mutex per frame:  the producer stalls on GPU submission
//! ```
//!
//! ## The Solution: Triple Buffering
//!
//! ```text
//! Producer writes slot W, commits:   W <-> P   (P = pending)
//! Consumer starts a read:            R <-> P   (only if P is fresh)
//! ```
//!
//! The producer never waits for the consumer and the consumer never sees a
//! partially written slot.

mod triple_buffer;

pub use triple_buffer::{
    RoleSnapshot,
    SlotRole,
    TripleBuffer,
    TripleBufferReader,
    TripleBufferWriter,
};
