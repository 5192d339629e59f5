//! Steadyframe
//!
//! Turns raw YUV 4:2:0 camera frames into stabilized, upright RGBA frames and
//! hands the most recent one to a display loop running at its own pace.
//!
//! # Architecture
//!
//! The pipeline holds a few invariants by construction:
//!
//! 1. **Drop, never queue**: a frame arriving while another is in flight is discarded.
//! 2. **Latest wins**: the frame bus is a single slot; publishing overwrites it.
//! 3. **Whole frames only**: readers get a complete `Arc<FrameEnvelope>` or nothing.
//! 4. **Bounded memory**: stabilization history never exceeds its capacity.
//! 5. **Fail the frame, not the pipeline**: per-frame faults skip or pass through that frame.
//!
//! # Module Structure
//!
//! - `frame`: RawFrame, PackedFrame, LumaPlane, FrameEnvelope
//! - `convert`: YUV 4:2:0 to RGBA
//! - `motion`: block-matching translation estimate
//! - `stabilize`: smoothing, jitter gate, inverse warp, bounded history
//! - `orientation`: quarter-turn correction
//! - `bus`: single-slot frame handoff
//! - `pipeline`: per-frame orchestration and admission control
//! - `filter`, `render`: consumer-side display filtering and paced rendering
//! - `ingest`: frame sources
//! - `config`: JSON file plus environment overrides

pub mod bus;
pub mod config;
pub mod convert;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod orientation;
pub mod pipeline;
pub mod render;
pub mod stabilize;

pub use bus::{BusStats, FrameBus};
pub use config::PipelineConfig;
pub use convert::convert;
pub use filter::{apply_or_passthrough, DisplayFilter, EdgeHighlight, FilterMode, Passthrough};
pub use frame::{FrameEnvelope, LumaPlane, PackedFrame, Plane, RawFrame};
pub use ingest::{ChromaLayout, SyntheticConfig, SyntheticSource};
pub use motion::{MotionConfig, MotionEstimator, MotionTransform};
pub use orientation::{
    rotate, FixedOrientation, OrientationCorrector, OrientationSource, Rotation,
};
pub use pipeline::{Admission, PipelineOptions, PipelineOrchestrator, PipelineStats};
pub use render::{FrameSink, NullSink, PngSnapshotSink, RenderLoop, RenderOutcome, RenderStats};
pub use stabilize::{
    warp, FrameHistory, HistoryEntry, Outcome, StabilizationConfig, StabilizationFilter,
    StabilizationState, Stabilized,
};
