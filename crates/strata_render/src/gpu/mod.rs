//! # GPU Ownership
//!
//! The backend interface, fences, and the single thread that owns both.
//!
//! ## Rules
//!
//! 1. **One owner** - only the GPU thread calls [`GpuBackend`] methods
//! 2. **Never block on the GPU** - fences are polled, not waited on
//! 3. **Two hand-offs** - `call` when the result is needed, `post` when it is not

mod backend;
mod command_sync;
mod headless;
mod thread;

pub use backend::{FenceId, GpuBackend, GpuTextureId, MipRegion};
pub use command_sync::{CommandSync, SignalCallback, SyncStatus, SyncToken};
pub use headless::{BackendOp, HeadlessBackend};
pub use thread::{GpuContext, GpuTask, GpuThread, GpuThreadHandle};
