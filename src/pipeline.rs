//! Per-frame orchestration: Convert -> Estimate -> Stabilize -> Rotate -> Publish.
//!
//! `submit` may be called from any capture thread. At most one frame is in
//! flight; a frame that arrives while a pass is running is dropped on the spot
//! rather than queued.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use crate::bus::FrameBus;
use crate::convert::convert;
use crate::frame::{FrameEnvelope, LumaPlane, RawFrame};
use crate::motion::{MotionConfig, MotionEstimator};
use crate::orientation::{OrientationCorrector, OrientationSource};
use crate::stabilize::{Outcome, StabilizationConfig, StabilizationFilter, StabilizationState};

/// Tuning for one pipeline instance.
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub motion: MotionConfig,
    pub stabilization: StabilizationConfig,
    /// Hardware-specific rotation added after sensor/device normalization.
    pub mounting_offset_degrees: i32,
}

/// What happened to a submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Processed and published under this envelope id.
    Published(u64),
    /// A previous frame was still in flight.
    Dropped,
    /// The pass failed; the frame was skipped.
    Failed,
}

/// Snapshot of pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub submitted: u64,
    pub published: u64,
    pub dropped_busy: u64,
    pub failed: u64,
    pub warped: u64,
    pub passed_through: u64,
    pub fallbacks: u64,
    pub last_pass: Duration,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    published: AtomicU64,
    dropped_busy: AtomicU64,
    failed: AtomicU64,
    warped: AtomicU64,
    passed_through: AtomicU64,
    fallbacks: AtomicU64,
    last_pass_us: AtomicU64,
}

/// Everything one pass touches. Only reachable through the orchestrator's
/// try-locked mutex, so exactly one thread uses it at a time.
struct Pass {
    estimator: MotionEstimator,
    filter: StabilizationFilter,
    corrector: OrientationCorrector,
    orientation: Box<dyn OrientationSource>,
    state: StabilizationState,
    next_id: u64,
}

impl Pass {
    fn run(
        &mut self,
        raw: RawFrame,
        stabilize: bool,
        reset: bool,
    ) -> Result<(FrameEnvelope, Option<Outcome>)> {
        if reset {
            log::info!("stabilization re-enabled; resetting state");
            self.state.reset();
        }

        let captured_at_ns = raw.timestamp_ns();
        let packed = convert(&raw)?;

        let (frame, outcome) = if stabilize {
            let luma = LumaPlane::from_raw(&raw);
            drop(raw);
            let motion = self.estimator.estimate(&mut self.state, luma);
            let stabilized = self.filter.stabilize(&mut self.state, packed, &motion);
            log::trace!(
                "motion raw=({:.2}, {:.2}) smoothed=({:.2}, {:.2}) outcome={:?}",
                motion.tx,
                motion.ty,
                stabilized.smoothed.tx,
                stabilized.smoothed.ty,
                stabilized.outcome
            );
            (stabilized.frame, Some(stabilized.outcome))
        } else {
            (packed, None)
        };

        let rotated = self.corrector.correct(&frame, self.orientation.as_ref())?;
        let id = self.next_id;
        self.next_id += 1;
        Ok((FrameEnvelope::new(id, captured_at_ns, rotated), outcome))
    }
}

pub struct PipelineOrchestrator {
    bus: Arc<FrameBus>,
    pass: Mutex<Pass>,
    stabilization_enabled: AtomicBool,
    /// Set by an off -> on toggle, consumed by the next pass.
    reset_pending: AtomicBool,
    counters: Counters,
}

impl PipelineOrchestrator {
    pub fn new(
        options: PipelineOptions,
        orientation: Box<dyn OrientationSource>,
        bus: Arc<FrameBus>,
    ) -> Result<Self> {
        let corrector = OrientationCorrector::new(options.mounting_offset_degrees)?;
        let enabled = options.stabilization.enabled;
        let pass = Pass {
            estimator: MotionEstimator::new(options.motion),
            filter: StabilizationFilter::new(options.stabilization),
            corrector,
            orientation,
            state: StabilizationState::with_history_capacity(
                options.stabilization.history_capacity,
            ),
            next_id: 1,
        };
        Ok(Self {
            bus,
            pass: Mutex::new(pass),
            stabilization_enabled: AtomicBool::new(enabled),
            reset_pending: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    pub fn bus(&self) -> &Arc<FrameBus> {
        &self.bus
    }

    /// Run one frame through the pipeline unless another frame is in flight.
    pub fn submit(&self, raw: RawFrame) -> Admission {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let mut pass = match self.pass.try_lock() {
            Ok(pass) => pass,
            Err(TryLockError::WouldBlock) => {
                self.counters.dropped_busy.fetch_add(1, Ordering::Relaxed);
                log::trace!("pipeline busy; dropping frame at {}ns", raw.timestamp_ns());
                return Admission::Dropped;
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("previous pass panicked; continuing with its state");
                poisoned.into_inner()
            }
        };

        let started = Instant::now();
        // Read the toggle before the reset flag so an enable racing this pass
        // leaves its reset for the next one.
        let stabilize = self.stabilization_enabled.load(Ordering::Acquire);
        let reset = self.reset_pending.swap(false, Ordering::AcqRel);
        let result = pass.run(raw, stabilize, reset);
        drop(pass);
        let elapsed = started.elapsed();
        self.counters
            .last_pass_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);

        match result {
            Ok((envelope, outcome)) => {
                let id = envelope.id();
                if let Some(outcome) = outcome {
                    let counter = match outcome {
                        Outcome::Warped => &self.counters.warped,
                        Outcome::PassedThrough => &self.counters.passed_through,
                        Outcome::Fallback => &self.counters.fallbacks,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                self.bus.publish(Arc::new(envelope));
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                log::debug!("published frame {} in {:?}", id, elapsed);
                Admission::Published(id)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("frame dropped: {:#}", e);
                Admission::Failed
            }
        }
    }

    /// Toggle stabilization. Turning it back on resets the stabilization
    /// state at the start of the next pass, whether or not any frame ran
    /// while it was off.
    pub fn set_stabilization_enabled(&self, enabled: bool) {
        let was = self.stabilization_enabled.swap(enabled, Ordering::AcqRel);
        if !was && enabled {
            self.reset_pending.store(true, Ordering::Release);
        }
        if was != enabled {
            log::info!("stabilization {}", if enabled { "on" } else { "off" });
        }
    }

    pub fn stabilization_enabled(&self) -> bool {
        self.stabilization_enabled.load(Ordering::Acquire)
    }

    /// Read the stabilization state. Waits for an in-flight pass; not for the capture path.
    pub fn inspect_state<R>(&self, f: impl FnOnce(&StabilizationState) -> R) -> R {
        let pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner);
        f(&pass.state)
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            dropped_busy: c.dropped_busy.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            warped: c.warped.load(Ordering::Relaxed),
            passed_through: c.passed_through.load(Ordering::Relaxed),
            fallbacks: c.fallbacks.load(Ordering::Relaxed),
            last_pass: Duration::from_micros(c.last_pass_us.load(Ordering::Relaxed)),
        }
    }
}
