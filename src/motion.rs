//! Block-matching motion estimation.
//!
//! The match score is the absolute luma difference at the single sample pixel,
//! not a block sum. Only translation is estimated.

use serde::Deserialize;

use crate::frame::LumaPlane;
use crate::stabilize::StabilizationState;

pub const DEFAULT_GRID_STRIDE: usize = 32;
pub const DEFAULT_SEARCH_RADIUS: usize = 16;
pub const DEFAULT_SEARCH_STEP: usize = 4;
pub const DEFAULT_MATCH_THRESHOLD: u32 = 50;

/// Frame-to-frame motion: how far the current frame has shifted relative to the reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionTransform {
    pub tx: f64,
    pub ty: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub shear: f64,
}

impl MotionTransform {
    pub const IDENTITY: MotionTransform = MotionTransform {
        tx: 0.0,
        ty: 0.0,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        shear: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// Euclidean length of the translation component.
    pub fn magnitude(&self) -> f64 {
        (self.tx * self.tx + self.ty * self.ty).sqrt()
    }

    /// Component-wise `self * (1 - alpha) + other * alpha`.
    pub fn blend(&self, other: &MotionTransform, alpha: f64) -> Self {
        let mix = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
        Self {
            tx: mix(self.tx, other.tx),
            ty: mix(self.ty, other.ty),
            rotation: mix(self.rotation, other.rotation),
            scale_x: mix(self.scale_x, other.scale_x),
            scale_y: mix(self.scale_y, other.scale_y),
            shear: mix(self.shear, other.shear),
        }
    }

    pub fn is_finite(&self) -> bool {
        [
            self.tx,
            self.ty,
            self.rotation,
            self.scale_x,
            self.scale_y,
            self.shear,
        ]
        .iter()
        .all(|c| c.is_finite())
    }
}

impl Default for MotionTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Block-matching parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Spacing of the sample grid, both axes.
    pub grid_stride: usize,
    /// Search window half-width, both axes.
    pub search_radius: usize,
    /// Candidate offset spacing inside the window.
    pub search_step: usize,
    /// A point is accepted only when its best score is strictly below this.
    pub match_threshold: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            grid_stride: DEFAULT_GRID_STRIDE,
            search_radius: DEFAULT_SEARCH_RADIUS,
            search_step: DEFAULT_SEARCH_STEP,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Estimates translation between consecutive luma planes.
///
/// The previous plane lives in `StabilizationState` so the estimator itself
/// carries only configuration.
#[derive(Clone, Debug, Default)]
pub struct MotionEstimator {
    config: MotionConfig,
}

impl MotionEstimator {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Estimate motion of `current` against the reference held in `state`,
    /// then make `current` the new reference.
    ///
    /// Returns identity when there is no usable reference.
    pub fn estimate(&self, state: &mut StabilizationState, current: LumaPlane) -> MotionTransform {
        let motion = match state.reference_luma() {
            Some(previous) => self.match_planes(previous, &current),
            None => MotionTransform::IDENTITY,
        };
        state.set_reference_luma(current);
        motion
    }

    /// Match `current` against `previous` over the sample grid.
    ///
    /// For each grid point `p` the candidate offset `d` is scored by
    /// `|previous[p] - current[p + d]|`, so a positive `tx` means content moved
    /// right. The zero offset is scored first and only a strictly better
    /// candidate displaces it.
    pub fn match_planes(&self, previous: &LumaPlane, current: &LumaPlane) -> MotionTransform {
        if previous.width() != current.width() || previous.height() != current.height() {
            log::debug!(
                "reference luma {}x{} does not match current {}x{}; skipping estimate",
                previous.width(),
                previous.height(),
                current.width(),
                current.height()
            );
            return MotionTransform::IDENTITY;
        }

        let cfg = &self.config;
        let (w, h) = (current.width() as usize, current.height() as usize);
        let r = cfg.search_radius;
        if cfg.grid_stride == 0 || cfg.search_step == 0 || w <= 2 * r || h <= 2 * r {
            return MotionTransform::IDENTITY;
        }

        let offsets = candidate_offsets(r, cfg.search_step);
        let mut sum_dx = 0i64;
        let mut sum_dy = 0i64;
        let mut accepted = 0u32;

        for y in (r..h - r).step_by(cfg.grid_stride) {
            for x in (r..w - r).step_by(cfg.grid_stride) {
                let reference = previous.at(x, y) as i32;
                let score = |dx: isize, dy: isize| {
                    let cx = (x as isize + dx) as usize;
                    let cy = (y as isize + dy) as usize;
                    (reference - current.at(cx, cy) as i32).unsigned_abs()
                };

                let mut best = (0isize, 0isize);
                let mut best_score = score(0, 0);
                for &(dx, dy) in &offsets {
                    if best_score == 0 {
                        break;
                    }
                    let s = score(dx, dy);
                    if s < best_score {
                        best_score = s;
                        best = (dx, dy);
                    }
                }

                if best_score < cfg.match_threshold {
                    sum_dx += best.0 as i64;
                    sum_dy += best.1 as i64;
                    accepted += 1;
                }
            }
        }

        if accepted == 0 {
            return MotionTransform::IDENTITY;
        }
        MotionTransform::translation(
            sum_dx as f64 / accepted as f64,
            sum_dy as f64 / accepted as f64,
        )
    }
}

/// Every `(dx, dy)` in `[-radius, radius]` at `step`, row-major.
fn candidate_offsets(radius: usize, step: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let axis: Vec<isize> = (-r..=r).step_by(step).collect();
    axis.iter()
        .flat_map(|&dy| axis.iter().map(move |&dx| (dx, dy)))
        .collect()
}
