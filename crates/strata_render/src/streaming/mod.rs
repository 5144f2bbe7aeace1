//! # Texture Streaming
//!
//! Residency management for streamed textures.
//!
//! ```text
//!   extraction thread          upload workers              GPU thread
//!   ┌────────────────┐        ┌──────────────┐        ┌────────────────┐
//!   │ TextureManager │ tasks  │ load_mip     │ call   │ upload band    │
//!   │  .update()     │ ─────► │ staging copy │ ─────► │ fence(release) │
//!   └────────────────┘        └──────────────┘        └────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. **Coarse to fine** - a texture's mips land strictly from its coarsest level down
//! 2. **Pressure degrades, never stalls** - budget and allocation failures route to fallbacks
//! 3. **Staging buffers return on fence signal** - never before the GPU has consumed the copy

mod descriptor;
mod handle;
mod manager;
mod pool;
mod source;
mod stats;
mod transfer;
mod upload_queue;
mod upload_state;
mod usage;
mod workers;

pub use descriptor::{
    full_mip_count, FilterConfig, FilterMode, PixelFormat, TextureDescriptor, TextureDimension, WrapMode,
};
pub use handle::{DynamicTexture, StaticTexture, TextureHandle, TextureId};
pub use manager::{ResolvedTexture, TextureManager, TickReport};
pub use pool::{Admission, PoolStats, TexturePool};
pub use source::{MipChain, Rgba8, TextureSource};
pub use stats::StreamingStats;
pub use transfer::{TransferBufferPool, TransferLease};
pub use upload_queue::{UploadQueue, UploadTask};
pub use upload_state::UploadState;
pub use usage::{EvictionPolicy, UsageRecord, UsageTracker};
