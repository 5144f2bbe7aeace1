//! # Memory Management
//!
//! Recycling structures for expensive resources.
//!
//! ## Design Philosophy
//!
//! Allocation on the GPU-bound thread is expensive. Storage is:
//! - Recycled by compatibility key, not freed
//! - Reclaimed in O(1)
//! - Bounded per key, so a burst of evictions cannot grow without limit

mod free_list;

pub use free_list::KeyedFreeList;
