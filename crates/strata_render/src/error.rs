//! # Render Error Types
//!
//! All recoverable errors of the frame pump and the texture streamer.
//!
//! Programming errors (fence deleted twice, triple-buffer role aliasing,
//! blocking calls issued from the GPU thread itself) are not represented
//! here: they panic.

use thiserror::Error;

use crate::streaming::{TextureId, UploadState};

/// Errors that can occur in the render pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A backend call failed.
    #[error("backend call `{op}` failed: {reason}")]
    Backend {
        /// Name of the backend operation.
        op: &'static str,
        /// Backend-provided reason.
        reason: String,
    },

    /// The backend ran out of texture memory.
    #[error("out of GPU memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested.
        requested: u64,
        /// Bytes still available.
        available: u64,
    },

    /// The GPU thread has stopped; the hand-off could not complete.
    #[error("GPU thread is gone")]
    GpuThreadGone,

    /// The streamer is shutting down.
    #[error("texture streamer is shutting down")]
    ShuttingDown,

    /// No texture is registered under this id.
    #[error("unknown texture: {0}")]
    UnknownTexture(TextureId),

    /// An upload state transition outside the legal edges.
    #[error("illegal upload state transition: {from} -> {to}")]
    InvalidTransition {
        /// State before the attempted transition.
        from: UploadState,
        /// Requested state.
        to: UploadState,
    },

    /// A texture source could not provide a mip level.
    #[error("texture source `{name}` cannot provide mip {level}: {reason}")]
    SourceUnavailable {
        /// Source name.
        name: String,
        /// Requested mip level.
        level: u32,
        /// Reason.
        reason: String,
    },

    /// A texture source reported a descriptor no texture can have.
    #[error("texture source `{name}` has an invalid descriptor: {reason}")]
    InvalidDescriptor {
        /// Source name.
        name: String,
        /// Reason.
        reason: String,
    },

    /// A single row of a mip does not fit in a staging buffer.
    #[error("staging buffer too small: need {needed} bytes, buffer holds {capacity}")]
    StagingOverflow {
        /// Bytes needed for one row.
        needed: usize,
        /// Staging buffer capacity.
        capacity: usize,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// I/O failure while reading configuration or sources.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
