//! # Render State
//!
//! The per-frame snapshot passed from extraction to the GPU thread through a
//! [`TripleBuffer`].
//!
//! The producer fills `payload`, [`FrameProducer::commit`] stamps the next
//! cycle number and publishes. The GPU thread attaches a [`SyncToken`] once
//! it has submitted the state, so anyone holding the snapshot can tell when
//! the GPU is done with it.

use strata_core::{TripleBuffer, TripleBufferReader, TripleBufferWriter};

use crate::gpu::SyncToken;

/// One frame's worth of extracted state.
#[derive(Clone, Debug, Default)]
pub struct RenderState<P> {
    cycle: u64,
    sync: Option<SyncToken>,
    payload: P,
}

impl<P> RenderState<P> {
    /// A state with cycle 0 and no fence.
    pub fn new(payload: P) -> Self {
        Self {
            cycle: 0,
            sync: None,
            payload,
        }
    }

    /// Monotonic frame number; 0 until first committed.
    #[inline]
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Fence inserted after this state was submitted.
    #[inline]
    #[must_use]
    pub fn sync(&self) -> Option<&SyncToken> {
        self.sync.as_ref()
    }

    /// Whether the GPU has finished with this state.
    #[must_use]
    pub fn is_gpu_retired(&self) -> bool {
        self.sync.as_ref().is_some_and(SyncToken::is_signaled)
    }

    /// The extracted payload.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// The extracted payload, mutably.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub(crate) fn attach_sync(&mut self, token: SyncToken) {
        self.sync = Some(token);
    }
}

/// Producer side of the frame handoff.
pub struct FrameProducer<P> {
    writer: TripleBufferWriter<RenderState<P>>,
    next_cycle: u64,
}

impl<P> FrameProducer<P> {
    /// Payload of the state being written.
    pub fn payload_mut(&mut self) -> &mut P {
        self.writer.current_write_state().payload_mut()
    }

    /// Publishes the state being written under the next cycle number.
    ///
    /// Returns the cycle number. Any fence left over from the slot's previous
    /// use is cleared.
    pub fn commit(&mut self) -> u64 {
        self.next_cycle += 1;
        let state = self.writer.current_write_state();
        state.cycle = self.next_cycle;
        state.sync = None;
        self.writer.commit_write();
        self.next_cycle
    }

    /// Cycle number of the last commit.
    #[must_use]
    pub const fn last_cycle(&self) -> u64 {
        self.next_cycle
    }

    /// Underlying triple buffer.
    #[must_use]
    pub fn buffer(&self) -> &TripleBuffer<RenderState<P>> {
        self.writer.buffer()
    }
}

/// Creates a frame handoff whose three slots start as clones of `initial`.
pub fn render_channel<P: Clone>(initial: P) -> (FrameProducer<P>, TripleBufferReader<RenderState<P>>) {
    let (writer, reader) = TripleBuffer::new(RenderState::new(initial));
    (
        FrameProducer {
            writer,
            next_cycle: 0,
        },
        reader,
    )
}
