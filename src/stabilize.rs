//! Temporal smoothing and inverse warping.
//!
//! `StabilizationState` is owned by one pipeline and threaded through every call
//! by `&mut`. `StabilizationFilter` only holds tuning.
//!
//! Stabilization is best-effort: internal faults turn into `Outcome::Fallback`
//! and the input frame is returned unchanged.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::VecDeque;

use crate::frame::{packed_len, try_alloc, LumaPlane, PackedFrame, CHANNELS, OPAQUE_BLACK};
use crate::motion::MotionTransform;

/// Weight given to the newest raw estimate.
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.3;

/// Smoothed translations at or below this many pixels are treated as sensor noise.
pub const DEFAULT_JITTER_FLOOR: f64 = 0.15;

/// Stabilized frames retained for multi-frame work.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

// ----------------------------------------------------------------------------
// FrameHistory: bounded ring of recent stabilized frames
// ----------------------------------------------------------------------------

/// One retained stabilized frame.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub transform: MotionTransform,
    pub frame: PackedFrame,
}

/// Bounded ring buffer of stabilized frames. Oldest entries are evicted first.
///
/// The pipeline only writes to it; readers go through `inspect_state`.
#[derive(Debug)]
pub struct FrameHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting from the front as needed.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Memory usage estimate.
    pub fn memory_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.frame.pixels().len()).sum()
    }
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ----------------------------------------------------------------------------
// StabilizationState
// ----------------------------------------------------------------------------

/// Per-session stabilization state.
#[derive(Debug, Default)]
pub struct StabilizationState {
    smoothed: MotionTransform,
    history: FrameHistory,
    reference_luma: Option<LumaPlane>,
}

impl StabilizationState {
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            smoothed: MotionTransform::IDENTITY,
            history: FrameHistory::new(capacity),
            reference_luma: None,
        }
    }

    pub fn smoothed(&self) -> &MotionTransform {
        &self.smoothed
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn reference_luma(&self) -> Option<&LumaPlane> {
        self.reference_luma.as_ref()
    }

    pub(crate) fn set_reference_luma(&mut self, luma: LumaPlane) {
        self.reference_luma = Some(luma);
    }

    /// Forget everything learned so far: smoothed motion, history and reference luma.
    pub fn reset(&mut self) {
        self.smoothed = MotionTransform::IDENTITY;
        self.history.clear();
        self.reference_luma = None;
    }
}

// ----------------------------------------------------------------------------
// StabilizationFilter
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StabilizationConfig {
    pub enabled: bool,
    /// Smoothing factor in `(0, 1]`. Lower means more inertia.
    pub alpha: f64,
    /// Smoothed translation magnitude that must be exceeded before warping.
    pub jitter_floor: f64,
    pub history_capacity: usize,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: DEFAULT_SMOOTHING_ALPHA,
            jitter_floor: DEFAULT_JITTER_FLOOR,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// What the filter did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Warped,
    PassedThrough,
    /// An internal fault occurred; the input was returned unchanged.
    Fallback,
}

#[derive(Debug)]
pub struct Stabilized {
    pub frame: PackedFrame,
    pub smoothed: MotionTransform,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Default)]
pub struct StabilizationFilter {
    config: StabilizationConfig,
}

impl StabilizationFilter {
    pub fn new(config: StabilizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StabilizationConfig {
        &self.config
    }

    /// True when `smoothed` moves far enough to be worth warping.
    pub fn exceeds_jitter_floor(&self, smoothed: &MotionTransform) -> bool {
        smoothed.magnitude() > self.config.jitter_floor
    }

    /// Smooth `raw_motion` into `state`, warp `frame` against it when above the
    /// jitter floor, and record the result in the history.
    ///
    /// Never fails.
    pub fn stabilize(
        &self,
        state: &mut StabilizationState,
        frame: PackedFrame,
        raw_motion: &MotionTransform,
    ) -> Stabilized {
        let smoothed = state.smoothed.blend(raw_motion, self.config.alpha);
        state.smoothed = smoothed;

        let (frame, outcome) = if !smoothed.is_finite() {
            log::warn!(
                "non-finite smoothed motion {:?}; resetting and passing frame through",
                smoothed
            );
            state.smoothed = MotionTransform::IDENTITY;
            (frame, Outcome::Fallback)
        } else if !self.exceeds_jitter_floor(&smoothed) {
            (frame, Outcome::PassedThrough)
        } else {
            match warp(&frame, &smoothed) {
                Ok(warped) => (warped, Outcome::Warped),
                Err(e) => {
                    log::warn!("warp failed, passing frame through: {}", e);
                    (frame, Outcome::Fallback)
                }
            }
        };

        state.history.push(HistoryEntry {
            transform: state.smoothed,
            frame: frame.clone(),
        });

        Stabilized {
            frame,
            smoothed: state.smoothed,
            outcome,
        }
    }
}

/// Inverse warp by the translation in `motion`.
///
/// Destination `(x, y)` reads source `(x + tx, y + ty)`, truncated toward zero.
/// Sources outside the frame become opaque black.
pub fn warp(frame: &PackedFrame, motion: &MotionTransform) -> Result<PackedFrame> {
    if !motion.tx.is_finite() || !motion.ty.is_finite() {
        return Err(anyhow!("cannot warp by non-finite translation"));
    }
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let src = frame.pixels();
    let mut out = try_alloc(packed_len(frame.width(), frame.height()))?;

    for y in 0..h {
        let sy = (y as f64 + motion.ty).trunc();
        for x in 0..w {
            let sx = (x as f64 + motion.tx).trunc();
            let dst = ((y * w + x) as usize) * CHANNELS;
            if sx < 0.0 || sy < 0.0 || sx >= w as f64 || sy >= h as f64 {
                out[dst..dst + CHANNELS].copy_from_slice(&OPAQUE_BLACK);
            } else {
                let s = ((sy as i64 * w + sx as i64) as usize) * CHANNELS;
                out[dst..dst + CHANNELS].copy_from_slice(&src[s..s + CHANNELS]);
            }
        }
    }

    Ok(PackedFrame::new(frame.width(), frame.height(), out))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x1 frame with distinct pixels.
    fn strip() -> PackedFrame {
        PackedFrame::new(
            4,
            1,
            vec![
                10, 11, 12, 255, //
                20, 21, 22, 255, //
                30, 31, 32, 255, //
                40, 41, 42, 255,
            ],
        )
    }

    fn tagged(tag: u8) -> PackedFrame {
        PackedFrame::filled(2, 2, [tag, tag, tag, 255])
    }

    #[test]
    fn gate_is_strictly_greater_than_floor() {
        let filter = StabilizationFilter::default();
        assert!(!filter.exceeds_jitter_floor(&MotionTransform::translation(0.15, 0.0)));
        assert!(filter.exceeds_jitter_floor(&MotionTransform::translation(0.16, 0.0)));
    }

    #[test]
    fn smoothed_magnitude_at_floor_passes_through() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        // 0.3 * 0.5 == 0.15 from identity state
        let out = filter.stabilize(&mut state, strip(), &MotionTransform::translation(0.5, 0.0));
        assert_eq!(out.outcome, Outcome::PassedThrough);
        assert_eq!(out.frame, strip());
    }

    #[test]
    fn smoothed_magnitude_above_floor_warps() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        let raw = MotionTransform::translation(0.16 / DEFAULT_SMOOTHING_ALPHA, 0.0);
        let out = filter.stabilize(&mut state, strip(), &raw);
        assert!((out.smoothed.tx - 0.16).abs() < 1e-9);
        assert_eq!(out.outcome, Outcome::Warped);
        // sub-pixel shift truncates to the same pixels
        assert_eq!(out.frame, strip());
    }

    #[test]
    fn smoothing_accumulates_with_inertia() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        let raw = MotionTransform::translation(10.0, -10.0);
        filter.stabilize(&mut state, strip(), &raw);
        assert!((state.smoothed().tx - 3.0).abs() < 1e-9);
        filter.stabilize(&mut state, strip(), &raw);
        // 3.0 * 0.7 + 10.0 * 0.3
        assert!((state.smoothed().tx - 5.1).abs() < 1e-9);
        assert!((state.smoothed().ty + 5.1).abs() < 1e-9);
        assert!((state.smoothed().scale_x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn warp_shifts_content_and_fills_black() -> Result<()> {
        let warped = warp(&strip(), &MotionTransform::translation(1.0, 0.0))?;
        assert_eq!(warped.pixel(0, 0), [20, 21, 22, 255]);
        assert_eq!(warped.pixel(2, 0), [40, 41, 42, 255]);
        assert_eq!(warped.pixel(3, 0), OPAQUE_BLACK);

        let warped = warp(&strip(), &MotionTransform::translation(-2.7, 0.0))?;
        // -2.7 truncates to -2 for x = 0 (src -2.7 -> -2) and x = 1 (-1.7 -> -1)
        assert_eq!(warped.pixel(0, 0), OPAQUE_BLACK);
        assert_eq!(warped.pixel(1, 0), OPAQUE_BLACK);
        // x = 2: src -0.7 truncates to 0
        assert_eq!(warped.pixel(2, 0), [10, 11, 12, 255]);
        assert_eq!(warped.pixel(3, 0), [10, 11, 12, 255]);
        Ok(())
    }

    #[test]
    fn warp_vertical_out_of_frame_is_black() -> Result<()> {
        let frame = PackedFrame::filled(2, 2, [9, 9, 9, 9]);
        let warped = warp(&frame, &MotionTransform::translation(0.0, 5.0))?;
        assert!(warped.pixels().chunks_exact(4).all(|px| px == OPAQUE_BLACK));
        Ok(())
    }

    #[test]
    fn warp_rejects_non_finite_translation() {
        assert!(warp(&strip(), &MotionTransform::translation(f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn non_finite_motion_falls_back_and_resets() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        let out = filter.stabilize(
            &mut state,
            strip(),
            &MotionTransform::translation(f64::INFINITY, 0.0),
        );
        assert_eq!(out.outcome, Outcome::Fallback);
        assert_eq!(out.frame, strip());
        assert_eq!(*state.smoothed(), MotionTransform::IDENTITY);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn history_keeps_five_most_recent() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        for tag in 0..12u8 {
            filter.stabilize(&mut state, tagged(tag), &MotionTransform::IDENTITY);
            assert!(state.history().len() <= DEFAULT_HISTORY_CAPACITY);
        }
        let tags: Vec<u8> = state
            .history()
            .iter()
            .map(|e| e.frame.pixels()[0])
            .collect();
        assert_eq!(tags, vec![7, 8, 9, 10, 11]);
        assert_eq!(state.history().memory_bytes(), 5 * 16);
    }

    #[test]
    fn history_records_warped_frames() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        let out = filter.stabilize(
            &mut state,
            strip(),
            &MotionTransform::translation(10.0, 0.0),
        );
        assert_eq!(out.outcome, Outcome::Warped);
        let latest = state.history().latest().unwrap();
        assert_eq!(latest.frame, out.frame);
        assert_eq!(latest.transform, out.smoothed);
    }

    #[test]
    fn reset_clears_state() {
        let filter = StabilizationFilter::default();
        let mut state = StabilizationState::default();
        state.set_reference_luma(LumaPlane::new(1, 1, vec![0]).unwrap());
        filter.stabilize(&mut state, strip(), &MotionTransform::translation(4.0, 0.0));
        state.reset();
        assert!(state.history().is_empty());
        assert!(state.reference_luma().is_none());
        assert_eq!(*state.smoothed(), MotionTransform::IDENTITY);
    }
}
