//! Frame sources.
//!
//! Real camera acquisition lives outside this crate; a capture callback builds
//! `RawFrame`s with `RawFrame::new` and hands them to
//! `PipelineOrchestrator::submit`. The synthetic source here stands in for a
//! camera in the daemon, the demo and the tests.

pub mod synthetic;

pub use synthetic::{ChromaLayout, SyntheticConfig, SyntheticSource, SyntheticStats};
