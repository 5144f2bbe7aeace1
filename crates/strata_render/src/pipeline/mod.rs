//! # Frame Pipeline
//!
//! Extraction-to-GPU handoff and the per-tick submission loop.
//!
//! ```text
//!   extraction thread                         GPU thread
//!   ┌───────────────┐   TripleBuffer   ┌──────────────────┐
//!   │ FrameProducer │ ───────────────► │    FramePump     │
//!   │  .commit()    │   latest-wins    │  .tick(ctx)      │
//!   └───────────────┘                  └──────────────────┘
//! ```

mod frame_pump;
mod render_state;
mod stats;

pub use frame_pump::{FrameCommandProvider, FramePump, FrameSubmitter, PumpOutcome};
pub use render_state::{render_channel, FrameProducer, RenderState};
pub use stats::PumpStats;
