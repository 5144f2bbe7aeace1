//! # Upload State Machine
//!
//! ```text
//!   Unloaded ──► MarkedForUpload ──► Uploading(M-1) ──► ... ──► Uploading(0) ──► Uploaded
//!      ▲                                                                           │
//!      └──────────────────────────────── eviction ─────────────────────────────────┘
//!
//!   any state ──► ForceFallback ──► Unloaded (retry)
//! ```
//!
//! `Uploading(n)` means mip `n` is the next level to land; every level
//! coarser than `n` is already resident.

use std::fmt;

use crate::error::{RenderError, RenderResult};

/// Residency of a dynamic texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadState {
    /// No backing storage.
    Unloaded,
    /// Needed; waiting for backing storage.
    MarkedForUpload,
    /// Backing attached; `mip_level` is the next level to land.
    Uploading {
        /// Next mip level to upload.
        mip_level: u32,
    },
    /// Every mip level is resident.
    Uploaded,
    /// Rendered through the fallback texture until retried.
    ForceFallback,
}

impl UploadState {
    /// Whether `self -> next` is a legal edge for a texture with `mip_levels` levels.
    #[must_use]
    pub fn can_transition_to(self, next: Self, mip_levels: u32) -> bool {
        let coarsest = mip_levels.saturating_sub(1);
        match (self, next) {
            (Self::ForceFallback, Self::ForceFallback) => false,
            (_, Self::ForceFallback)
            | (Self::Unloaded, Self::MarkedForUpload)
            | (Self::Uploading { mip_level: 0 }, Self::Uploaded)
            | (Self::Uploaded | Self::ForceFallback, Self::Unloaded) => true,
            (Self::MarkedForUpload, Self::Uploading { mip_level }) => mip_level == coarsest,
            (Self::Uploading { mip_level: from }, Self::Uploading { mip_level: to }) => {
                from > 0 && to == from - 1
            }
            _ => false,
        }
    }

    /// Moves to `next` if the edge is legal.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidTransition`] and leaves the state
    /// unchanged if the edge is not legal.
    pub fn advance(&mut self, next: Self, mip_levels: u32) -> RenderResult<()> {
        if !self.can_transition_to(next, mip_levels) {
            return Err(RenderError::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    /// Finest mip level already resident, if any.
    #[must_use]
    pub const fn finest_landed_mip(self) -> Option<u32> {
        match self {
            Self::Uploading { mip_level } => Some(mip_level.saturating_add(1)),
            Self::Uploaded => Some(0),
            _ => None,
        }
    }

    /// Whether backing storage is attached.
    #[must_use]
    pub const fn has_backing(self) -> bool {
        matches!(self, Self::Uploading { .. } | Self::Uploaded)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("Unloaded"),
            Self::MarkedForUpload => f.write_str("MarkedForUpload"),
            Self::Uploading { mip_level } => write!(f, "Uploading({mip_level})"),
            Self::Uploaded => f.write_str("Uploaded"),
            Self::ForceFallback => f.write_str("ForceFallback"),
        }
    }
}
