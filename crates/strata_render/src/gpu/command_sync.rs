//! # GPU Command Sync
//!
//! Wraps a backend fence with a tiny state machine:
//!
//! ```text
//!   Pending ──check()──► Signaled ──delete()──► Deleted
//!      └───────────────────delete()────────────────┘
//! ```
//!
//! `check()` never blocks. Signaled is sticky. `delete()` must be called
//! exactly once; deleting twice or checking after delete is a programming
//! error and panics.
//!
//! Other threads observe the state through a [`SyncToken`], which is cheap
//! to clone and never touches the backend.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::gpu::backend::{FenceId, GpuBackend};

const SIGNALED: u8 = 0b01;
const DELETED: u8 = 0b10;

/// Callback run once when the fence signals.
pub type SignalCallback = Box<dyn FnOnce() + Send>;

/// Observable fence state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// GPU work before the fence may still be running.
    Pending,
    /// All work before the fence has completed.
    Signaled,
    /// The fence was released.
    Deleted,
}

/// Thread-safe observer of a [`CommandSync`].
#[derive(Clone, Debug)]
pub struct SyncToken {
    fence: FenceId,
    status: Arc<AtomicU8>,
}

impl SyncToken {
    /// Fence this token observes.
    #[must_use]
    pub const fn fence(&self) -> FenceId {
        self.fence
    }

    /// Current state, as last seen by the GPU thread.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let bits = self.status.load(Ordering::Acquire);
        if bits & DELETED != 0 {
            SyncStatus::Deleted
        } else if bits & SIGNALED != 0 {
            SyncStatus::Signaled
        } else {
            SyncStatus::Pending
        }
    }

    /// Whether the GPU finished the work before the fence.
    ///
    /// Stays true after the fence is deleted.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.status.load(Ordering::Acquire) & SIGNALED != 0
    }
}

/// Owner of one backend fence. Lives on the GPU thread.
pub struct CommandSync {
    fence: FenceId,
    status: Arc<AtomicU8>,
    on_signaled: Option<SignalCallback>,
}

impl CommandSync {
    /// Inserts a fence after all previously issued work.
    pub fn create<B: GpuBackend>(backend: &mut B) -> Self {
        Self {
            fence: backend.create_fence(),
            status: Arc::new(AtomicU8::new(0)),
            on_signaled: None,
        }
    }

    /// Inserts a fence that runs `on_signaled` exactly once when it signals.
    pub fn with_callback<B: GpuBackend>(backend: &mut B, on_signaled: SignalCallback) -> Self {
        let mut sync = Self::create(backend);
        sync.on_signaled = Some(on_signaled);
        sync
    }

    /// Returns an observer for other threads.
    #[must_use]
    pub fn token(&self) -> SyncToken {
        SyncToken {
            fence: self.fence,
            status: Arc::clone(&self.status),
        }
    }

    /// Fence id.
    #[must_use]
    pub const fn fence(&self) -> FenceId {
        self.fence
    }

    /// Whether the fence has been seen signaled.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.status.load(Ordering::Acquire) & SIGNALED != 0
    }

    /// Whether `delete` has run.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.status.load(Ordering::Acquire) & DELETED != 0
    }

    /// Non-blocking poll. Runs the callback on the `Pending -> Signaled` edge.
    ///
    /// # Panics
    ///
    /// Panics if called after [`CommandSync::delete`].
    pub fn check<B: GpuBackend>(&mut self, backend: &mut B) -> bool {
        assert!(!self.is_deleted(), "CommandSync {:?} checked after delete", self.fence);
        if self.is_signaled() {
            return true;
        }
        if !backend.poll_fence(self.fence) {
            return false;
        }
        self.status.fetch_or(SIGNALED, Ordering::AcqRel);
        if let Some(callback) = self.on_signaled.take() {
            callback();
        }
        true
    }

    /// Releases the fence.
    ///
    /// An unfired callback is dropped without running.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn delete<B: GpuBackend>(&mut self, backend: &mut B) {
        let previous = self.status.fetch_or(DELETED, Ordering::AcqRel);
        assert!(previous & DELETED == 0, "CommandSync {:?} deleted twice", self.fence);
        backend.delete_fence(self.fence);
        self.on_signaled = None;
    }
}

impl Drop for CommandSync {
    fn drop(&mut self) {
        if !self.is_deleted() && !std::thread::panicking() {
            warn!(fence = ?self.fence, "CommandSync dropped without delete; backend fence leaked");
        }
    }
}

impl std::fmt::Debug for CommandSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSync")
            .field("fence", &self.fence)
            .field("status", &self.token().status())
            .field("has_callback", &self.on_signaled.is_some())
            .finish()
    }
}
