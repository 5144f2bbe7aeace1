//! # GPU Thread
//!
//! One long-lived thread owns the [`GpuBackend`]. Everyone else hands work
//! to it through a [`GpuThreadHandle`]:
//!
//! ```text
//!   upload workers ─┐ call(f)  (blocking, one-shot reply)
//!   texture manager ┼───────────────┐
//!                   │ post(f)        ▼
//!                   └──────►  ┌──────────────────────────┐
//!                             │        GPU thread        │
//!                             │  loop {                  │
//!                             │    run blocking calls    │
//!                             │    pump.tick(ctx)        │
//!                             │  }                       │
//!                             └──────────────────────────┘
//! ```
//!
//! Blocking calls are served between pump ticks; posted tasks are drained
//! by the pump itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{RenderError, RenderResult};
use crate::gpu::backend::GpuBackend;
use crate::gpu::command_sync::{CommandSync, SignalCallback, SyncToken};
use crate::pipeline::{FramePump, PumpStats};

/// Fire-and-forget unit of GPU work.
pub type GpuTask<B> = Box<dyn FnOnce(&mut GpuContext<B>) -> RenderResult<()> + Send>;

type CallJob<B> = Box<dyn FnOnce(&mut GpuContext<B>) + Send>;

/// Everything owned by the GPU thread: the backend and the outstanding fences.
pub struct GpuContext<B: GpuBackend> {
    backend: B,
    fences: Vec<CommandSync>,
    fences_created: u64,
    fences_retired: u64,
}

impl<B: GpuBackend> GpuContext<B> {
    /// Wraps a backend. Normally done by [`GpuThread::spawn`].
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            fences: Vec::new(),
            fences_created: 0,
            fences_retired: 0,
        }
    }

    /// The backend.
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Inserts a fence after all work issued so far.
    pub fn create_command_sync(&mut self) -> SyncToken {
        let sync = CommandSync::create(&mut self.backend);
        self.track(sync)
    }

    /// Inserts a fence that runs `on_signaled` once the GPU passes it.
    pub fn create_command_sync_with(&mut self, on_signaled: SignalCallback) -> SyncToken {
        let sync = CommandSync::with_callback(&mut self.backend, on_signaled);
        self.track(sync)
    }

    fn track(&mut self, sync: CommandSync) -> SyncToken {
        let token = sync.token();
        self.fences.push(sync);
        self.fences_created += 1;
        token
    }

    /// Polls every outstanding fence without blocking.
    ///
    /// Signaled fences fire their callbacks and are deleted. Returns how many
    /// were retired.
    pub fn poll_fences(&mut self) -> usize {
        let backend = &mut self.backend;
        let before = self.fences.len();
        self.fences.retain_mut(|sync| {
            if sync.check(backend) {
                sync.delete(backend);
                false
            } else {
                true
            }
        });
        let retired = before - self.fences.len();
        self.fences_retired += retired as u64;
        retired
    }

    /// Fences created and not yet retired.
    #[inline]
    #[must_use]
    pub fn outstanding_fences(&self) -> usize {
        self.fences.len()
    }

    /// Total fences created.
    #[must_use]
    pub const fn fences_created(&self) -> u64 {
        self.fences_created
    }

    /// Total fences retired.
    #[must_use]
    pub const fn fences_retired(&self) -> u64 {
        self.fences_retired
    }

    /// Deletes every outstanding fence. Callbacks of unsignaled fences are
    /// dropped without running.
    pub fn release_fences(&mut self) {
        for mut sync in self.fences.drain(..) {
            sync.delete(&mut self.backend);
        }
    }
}

/// Cloneable sender side of the GPU thread.
pub struct GpuThreadHandle<B: GpuBackend> {
    calls: Sender<CallJob<B>>,
    tasks: Sender<GpuTask<B>>,
    gpu_thread: ThreadId,
}

impl<B: GpuBackend> Clone for GpuThreadHandle<B> {
    fn clone(&self) -> Self {
        Self {
            calls: self.calls.clone(),
            tasks: self.tasks.clone(),
            gpu_thread: self.gpu_thread,
        }
    }
}

impl<B: GpuBackend> GpuThreadHandle<B> {
    /// Runs `f` on the GPU thread and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or [`RenderError::GpuThreadGone`] if the
    /// thread stopped before replying.
    ///
    /// # Panics
    ///
    /// Panics if called from the GPU thread itself, which would deadlock.
    pub fn call<R, F>(&self, f: F) -> RenderResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut GpuContext<B>) -> RenderResult<R> + Send + 'static,
    {
        assert_ne!(
            thread::current().id(),
            self.gpu_thread,
            "Blocking GPU call issued from the GPU thread"
        );

        let (reply_tx, reply_rx) = bounded(1);
        let job: CallJob<B> = Box::new(move |ctx| {
            // The caller may have given up; nothing to do then.
            let _ = reply_tx.send(f(ctx));
        });
        self.calls.send(job).map_err(|_| RenderError::GpuThreadGone)?;

        reply_rx.recv().map_err(|_| {
            error!("GPU thread stopped while a caller was waiting");
            RenderError::GpuThreadGone
        })?
    }

    /// Queues `f` for the next pump tick without waiting.
    ///
    /// Failures inside `f` are logged by the pump.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::GpuThreadGone`] if the thread has stopped.
    pub fn post<F>(&self, f: F) -> RenderResult<()>
    where
        F: FnOnce(&mut GpuContext<B>) -> RenderResult<()> + Send + 'static,
    {
        self.tasks
            .send(Box::new(f))
            .map_err(|_| RenderError::GpuThreadGone)
    }

    /// Whether the current thread is the GPU thread.
    #[must_use]
    pub fn is_gpu_thread(&self) -> bool {
        thread::current().id() == self.gpu_thread
    }
}

/// The GPU thread itself. Stops and joins on drop.
pub struct GpuThread<B: GpuBackend> {
    handle: GpuThreadHandle<B>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    pump_stats: Arc<Mutex<PumpStats>>,
}

impl<B: GpuBackend> GpuThread<B> {
    /// Starts the GPU thread.
    ///
    /// `factory` runs on the new thread, so backends bound to their creating
    /// thread work. `pump` runs once per loop iteration.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] if the pump configuration is
    /// rejected, the factory's error, or [`RenderError::Io`] if the thread
    /// cannot be spawned.
    pub fn spawn<F, P>(factory: F, pump: FramePump<B, P>) -> RenderResult<Self>
    where
        F: FnOnce() -> RenderResult<B> + Send + 'static,
        P: Send + 'static,
    {
        pump.config().validate()?;

        let (call_tx, call_rx) = unbounded::<CallJob<B>>();
        let (ready_tx, ready_rx) = bounded::<RenderResult<()>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let pump_stats = pump.stats_handle();
        let task_tx = pump.task_sender();

        let thread_shutdown = Arc::clone(&shutdown);
        let join = thread::Builder::new()
            .name("strata-gpu".into())
            .spawn(move || {
                let backend = match factory() {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                Self::run(GpuContext::new(backend), pump, &call_rx, &thread_shutdown);
            })
            .map_err(|e| RenderError::Io(format!("failed to spawn GPU thread: {e}")))?;

        let gpu_thread = join.thread().id();
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = join.join();
                return Err(e);
            }
            Err(_) => {
                let _ = join.join();
                return Err(RenderError::GpuThreadGone);
            }
        }

        info!("GPU thread started");
        Ok(Self {
            handle: GpuThreadHandle {
                calls: call_tx,
                tasks: task_tx,
                gpu_thread,
            },
            shutdown,
            join: Some(join),
            pump_stats,
        })
    }

    fn run<P: 'static>(
        mut ctx: GpuContext<B>,
        mut pump: FramePump<B, P>,
        calls: &Receiver<CallJob<B>>,
        shutdown: &AtomicBool,
    ) {
        let idle = pump.config().tick_interval();

        while !shutdown.load(Ordering::Acquire) {
            let disconnected = select! {
                recv(calls) -> job => match job {
                    Ok(job) => {
                        job(&mut ctx);
                        false
                    }
                    Err(_) => true,
                },
                default(idle) => false,
            };
            if disconnected {
                break;
            }
            while let Ok(job) = calls.try_recv() {
                job(&mut ctx);
            }
            pump.tick(&mut ctx);
        }

        // Pending blocking calls are dropped; their callers see GpuThreadGone.
        pump.finish(&mut ctx);
        ctx.release_fences();
        debug!(
            fences_created = ctx.fences_created(),
            fences_retired = ctx.fences_retired(),
            "GPU thread drained"
        );
    }

    /// A new handle for another thread.
    #[must_use]
    pub fn handle(&self) -> GpuThreadHandle<B> {
        self.handle.clone()
    }

    /// Snapshot of the frame pump statistics.
    #[must_use]
    pub fn stats(&self) -> PumpStats {
        *self.pump_stats.lock()
    }

    /// Stops the loop and joins the thread. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("GPU thread panicked");
            } else {
                info!("GPU thread stopped");
            }
        }
    }
}

impl<B: GpuBackend> Drop for GpuThread<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
