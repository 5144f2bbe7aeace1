//! # STRATA Render
//!
//! GPU-thread frame pump and streaming texture cache:
//! - One thread owns the GPU backend; everyone else hands work to it
//! - Fences are polled once per tick and never waited on
//! - Textures stream in coarse-to-fine through a bounded set of staging buffers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      EXTRACTION THREAD                       │
//! │  FrameProducer.commit()          TextureManager.update()     │
//! └───────────┬───────────────────────────────┬──────────────────┘
//!             │ TripleBuffer (latest wins)    │ UploadQueue
//!             ▼                               ▼
//! ┌───────────────────────┐       ┌───────────────────────────┐
//! │      GPU THREAD       │ call  │      UPLOAD WORKERS       │
//! │ FramePump.tick()      │ ◄──── │ load mip → staging → band │
//! │ poll fences, submit   │       └───────────────────────────┘
//! └───────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - The producer never waits for the GPU thread
//! - A staging buffer is reused only after its fence signals
//! - Resource pressure degrades quality (mip bias, fallback), never stalls a frame

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod gpu;
pub mod pipeline;
pub mod streaming;

pub use config::{FallbackRetryPolicy, PumpConfig, StrataConfig, StreamingConfig};
pub use error::{RenderError, RenderResult};
pub use gpu::{GpuBackend, GpuContext, GpuTextureId, GpuThread, GpuThreadHandle, HeadlessBackend, SyncToken};
pub use pipeline::{render_channel, FrameCommandProvider, FramePump, FrameProducer, PumpOutcome, PumpStats, RenderState};
pub use streaming::{
    MipChain, ResolvedTexture, StreamingStats, TextureDescriptor, TextureId, TextureManager, TextureSource,
    TickReport, UploadState,
};
