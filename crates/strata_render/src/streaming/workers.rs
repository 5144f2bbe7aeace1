//! # Upload Workers
//!
//! Threads that move mip bytes from texture sources to the GPU.
//!
//! ```text
//!   loop:
//!     task  = queue.pop()                      (blocks on an empty queue)
//!     job   = shared.begin_upload(task)        (skip if stale or unregistered)
//!     bytes = source.load_mip(level)           (off the GPU thread)
//!     for each band of rows:
//!         lease = transfer.acquire()           (blocks on staging buffers)
//!         gpu.call(upload_sub_image + fence(on_signaled = free lease))
//!     next  = shared.complete_upload(task, result)
//!     queue.finish(next)
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::error::{RenderError, RenderResult};
use crate::gpu::{GpuBackend, GpuThreadHandle, MipRegion};
use crate::streaming::manager::{BeginUpload, StreamingShared, UploadJob};

/// Pool of upload worker threads. Stops and joins on drop.
pub(crate) struct UploadWorkers {
    shared: Arc<StreamingShared>,
    handles: Vec<JoinHandle<()>>,
}

impl UploadWorkers {
    /// Starts `count` workers.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Io`] if a thread cannot be spawned; workers
    /// already started are stopped.
    pub fn spawn<B: GpuBackend>(
        count: usize,
        shared: Arc<StreamingShared>,
        gpu: &GpuThreadHandle<B>,
    ) -> RenderResult<Self> {
        let mut workers = Self {
            shared: Arc::clone(&shared),
            handles: Vec::with_capacity(count),
        };
        for index in 0..count {
            let shared = Arc::clone(&shared);
            let gpu = gpu.clone();
            let handle = thread::Builder::new()
                .name(format!("strata-upload-{index}"))
                .spawn(move || worker_loop(index, &shared, &gpu))
                .map_err(|e| RenderError::Io(format!("failed to spawn upload worker: {e}")))?;
            workers.handles.push(handle);
        }
        info!(count, "upload workers started");
        Ok(workers)
    }

    /// Closes the queue and the staging pool, then joins every worker.
    /// An upload in progress finishes its current band first.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.shared.queue.close();
        self.shared.transfer.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("upload worker panicked");
            }
        }
        info!("upload workers stopped");
    }
}

impl Drop for UploadWorkers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<B: GpuBackend>(index: usize, shared: &StreamingShared, gpu: &GpuThreadHandle<B>) {
    while let Some(task) = shared.queue.pop() {
        let next = match shared.begin_upload(task) {
            BeginUpload::Run(job) => {
                let result = upload_mip(shared, gpu, &job, task.mip_level);
                let outcome = shared.complete_upload(task, result);
                if let Some(texture) = outcome.delete {
                    post_delete(gpu, texture);
                }
                outcome.next
            }
            BeginUpload::Skip { delete } => {
                if let Some(texture) = delete {
                    post_delete(gpu, texture);
                }
                None
            }
        };
        shared.queue.finish(next);
    }
    debug!(worker = index, "upload worker exiting");
}

fn post_delete<B: GpuBackend>(gpu: &GpuThreadHandle<B>, texture: crate::gpu::GpuTextureId) {
    let posted = gpu.post(move |ctx| {
        ctx.backend_mut().delete_texture(texture);
        Ok(())
    });
    if posted.is_err() {
        debug!(%texture, "GPU thread gone; texture delete skipped");
    }
}

/// Streams one mip level through the staging buffers. Returns the number
/// of bands copied.
fn upload_mip<B: GpuBackend>(
    shared: &StreamingShared,
    gpu: &GpuThreadHandle<B>,
    job: &UploadJob,
    level: u32,
) -> RenderResult<u64> {
    let descriptor = job.descriptor;
    let bytes = job.source.load_mip(level)?;
    let expected = descriptor.mip_size_bytes(level);
    if bytes.len() != expected {
        return Err(RenderError::SourceUnavailable {
            name: job.source.name().to_string(),
            level,
            reason: format!("expected {expected} bytes, got {}", bytes.len()),
        });
    }

    let row_bytes = descriptor.row_bytes(level);
    let capacity = shared.transfer.buffer_size();
    if row_bytes > capacity {
        return Err(RenderError::StagingOverflow {
            needed: row_bytes,
            capacity,
        });
    }

    let rows = descriptor.block_rows(level);
    let rows_per_band = u32::try_from(capacity / row_bytes).unwrap_or(u32::MAX).min(rows).max(1);
    let block = descriptor.format.block_dim();
    let (width, height) = descriptor.mip_extent(level);
    let layer_bytes = descriptor.layer_size_bytes(level);
    let backing = job.backing;
    let mut bands = 0u64;

    for layer in 0..descriptor.dimension.layer_count() {
        let mut row = 0;
        while row < rows {
            let band_rows = rows_per_band.min(rows - row);
            let start = layer as usize * layer_bytes + row as usize * row_bytes;
            let end = start + band_rows as usize * row_bytes;

            let Some(mut lease) = shared.transfer.acquire() else {
                return Err(RenderError::ShuttingDown);
            };
            lease.fill(&bytes[start..end]);

            let y = row * block;
            let region = MipRegion {
                x: 0,
                y,
                layer,
                width,
                height: (band_rows * block).min(height - y),
            };
            gpu.call(move |ctx| {
                ctx.backend_mut()
                    .upload_sub_image(backing, level, region, lease.bytes())?;
                // The buffer is reusable once the GPU has consumed the copy.
                ctx.create_command_sync_with(Box::new(move || drop(lease)));
                Ok(())
            })?;

            bands += 1;
            row += band_rows;
        }
    }
    Ok(bands)
}
