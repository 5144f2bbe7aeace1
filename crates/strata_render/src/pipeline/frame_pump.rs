//! # Frame Pump
//!
//! The polling loop body run by the GPU thread.
//!
//! ```text
//!   tick():
//!     1. poll fences          -> fire on_signaled, delete retired fences
//!     2. command providers    -> record per-frame work (if ready)
//!        posted tasks         -> drain the fire-and-forget queue
//!     3. pacing               -> skip if max_outstanding_fences are pending
//!        start_read/stop_read -> skip if nothing new was committed
//!        submit_frame         -> backend
//!        create fence         -> attach to the submitted state
//! ```
//!
//! A failure in steps 2 or 3 is logged and counted; the loop keeps going.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use strata_core::TripleBufferReader;
use tracing::{trace, warn};

use crate::config::PumpConfig;
use crate::error::RenderResult;
use crate::gpu::{GpuBackend, GpuContext, GpuTask};
use crate::pipeline::render_state::RenderState;
use crate::pipeline::stats::PumpStats;

/// Per-frame GPU work registered with the pump.
pub trait FrameCommandProvider<B: GpuBackend>: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether to run this tick.
    fn is_ready(&self) -> bool {
        true
    }

    /// Records this provider's commands.
    ///
    /// # Errors
    ///
    /// Any error is logged by the pump and does not stop the frame.
    fn record(&mut self, ctx: &mut GpuContext<B>) -> RenderResult<()>;
}

/// Hands one render state to the backend.
pub type FrameSubmitter<B, P> = Box<dyn FnMut(&mut B, &RenderState<P>) -> RenderResult<()> + Send>;

/// What one tick did with the frame handoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// A new state was submitted.
    Submitted {
        /// Its cycle number.
        cycle: u64,
    },
    /// Nothing new was committed since the last submission.
    Stale,
    /// Too many frames in flight.
    Paced,
    /// Submission failed.
    Failed,
    /// No frame handoff is attached.
    NoFrames,
}

/// GPU-thread loop body. See the module docs for the tick order.
pub struct FramePump<B: GpuBackend, P = ()> {
    config: PumpConfig,
    frames: Option<TripleBufferReader<RenderState<P>>>,
    submitter: FrameSubmitter<B, P>,
    providers: Vec<Box<dyn FrameCommandProvider<B>>>,
    task_tx: Sender<GpuTask<B>>,
    task_rx: Receiver<GpuTask<B>>,
    stats: Arc<Mutex<PumpStats>>,
}

impl<B: GpuBackend, P: 'static> FramePump<B, P> {
    /// A pump with no frame handoff; it still retires fences and runs
    /// providers and posted tasks.
    #[must_use]
    pub fn new(config: PumpConfig) -> Self {
        let (task_tx, task_rx) = unbounded();
        Self {
            config,
            frames: None,
            submitter: Box::new(|backend: &mut B, state: &RenderState<P>| {
                backend.submit_frame(state.cycle())
            }),
            providers: Vec::new(),
            task_tx,
            task_rx,
            stats: Arc::new(Mutex::new(PumpStats::default())),
        }
    }

    /// Attaches the consumer side of a frame handoff.
    #[must_use]
    pub fn with_frames(mut self, reader: TripleBufferReader<RenderState<P>>) -> Self {
        self.frames = Some(reader);
        self
    }

    /// Replaces the default submitter, which calls
    /// [`GpuBackend::submit_frame`] with the state's cycle.
    #[must_use]
    pub fn with_submitter(mut self, submitter: FrameSubmitter<B, P>) -> Self {
        self.submitter = submitter;
        self
    }

    /// Registers a per-frame command provider. Providers run in registration order.
    pub fn add_provider(&mut self, provider: Box<dyn FrameCommandProvider<B>>) {
        self.providers.push(provider);
    }

    /// Pacing configuration.
    #[must_use]
    pub const fn config(&self) -> &PumpConfig {
        &self.config
    }

    /// Sender for fire-and-forget tasks.
    #[must_use]
    pub fn task_sender(&self) -> Sender<GpuTask<B>> {
        self.task_tx.clone()
    }

    /// Shared statistics, readable from other threads.
    #[must_use]
    pub fn stats_handle(&self) -> Arc<Mutex<PumpStats>> {
        Arc::clone(&self.stats)
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> PumpStats {
        *self.stats.lock()
    }

    /// Runs one pump iteration.
    pub fn tick(&mut self, ctx: &mut GpuContext<B>) -> PumpOutcome {
        ctx.poll_fences();

        let mut provider_runs = 0u64;
        let mut failures = 0u64;
        for provider in &mut self.providers {
            if !provider.is_ready() {
                continue;
            }
            provider_runs += 1;
            if let Err(e) = provider.record(ctx) {
                failures += 1;
                warn!(provider = provider.name(), error = %e, "command provider failed");
            }
        }

        let (tasks_run, task_failures) = self.drain_tasks(ctx);
        failures += task_failures;

        let outcome = self.submit(ctx);
        if outcome == PumpOutcome::Failed {
            failures += 1;
        }

        let mut stats = self.stats.lock();
        stats.ticks += 1;
        stats.provider_runs += provider_runs;
        stats.tasks_run += tasks_run;
        stats.failures += failures;
        stats.fences_created = ctx.fences_created();
        stats.fences_retired = ctx.fences_retired();
        match outcome {
            PumpOutcome::Submitted { .. } => stats.frames_submitted += 1,
            PumpOutcome::Stale => stats.stale_reads += 1,
            PumpOutcome::Paced => stats.frames_paced += 1,
            PumpOutcome::Failed | PumpOutcome::NoFrames => {}
        }
        outcome
    }

    fn drain_tasks(&mut self, ctx: &mut GpuContext<B>) -> (u64, u64) {
        let mut run = 0;
        let mut failed = 0;
        while let Ok(task) = self.task_rx.try_recv() {
            run += 1;
            if let Err(e) = task(ctx) {
                failed += 1;
                warn!(error = %e, "posted GPU task failed");
            }
        }
        (run, failed)
    }

    fn submit(&mut self, ctx: &mut GpuContext<B>) -> PumpOutcome {
        let Some(reader) = self.frames.as_mut() else {
            return PumpOutcome::NoFrames;
        };

        if ctx.outstanding_fences() >= self.config.max_outstanding_fences {
            return PumpOutcome::Paced;
        }

        reader.start_read();
        if !reader.stop_read() {
            return PumpOutcome::Stale;
        }

        let state = reader.current_read_state();
        let cycle = state.cycle();
        if let Err(e) = (self.submitter)(ctx.backend_mut(), state) {
            warn!(cycle, error = %e, "frame submission failed");
            return PumpOutcome::Failed;
        }

        let token = ctx.create_command_sync();
        reader.current_read_state_mut().attach_sync(token);
        trace!(cycle, "frame submitted");
        PumpOutcome::Submitted { cycle }
    }

    /// Final drain before the GPU thread exits: runs every posted task still
    /// queued so deletions are not lost.
    pub fn finish(&mut self, ctx: &mut GpuContext<B>) {
        let (run, failed) = self.drain_tasks(ctx);
        let mut stats = self.stats.lock();
        stats.tasks_run += run;
        stats.failures += failed;
    }
}
