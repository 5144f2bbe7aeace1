//! Frame pump statistics.

/// Counters kept by the frame pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Pump ticks run.
    pub ticks: u64,
    /// Frames handed to the backend.
    pub frames_submitted: u64,
    /// Ticks that skipped submission because too many fences were pending.
    pub frames_paced: u64,
    /// Ticks that skipped submission because nothing new was committed.
    pub stale_reads: u64,
    /// Fences created (frames and uploads).
    pub fences_created: u64,
    /// Fences seen signaled and deleted.
    pub fences_retired: u64,
    /// Fire-and-forget tasks run.
    pub tasks_run: u64,
    /// Command provider invocations.
    pub provider_runs: u64,
    /// Failed submissions, tasks and provider invocations.
    pub failures: u64,
}

impl PumpStats {
    /// Fraction of ticks that submitted a frame.
    #[must_use]
    pub fn submit_ratio(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.frames_submitted as f64 / self.ticks as f64
        }
    }
}
