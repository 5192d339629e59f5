//! Display-side filters applied to published frames before rendering.

use anyhow::{anyhow, Result};
use image::GrayImage;
use serde::Deserialize;
use std::borrow::Cow;

use crate::frame::{packed_len, LumaPlane, PackedFrame, CHANNELS};

/// Gaussian blur applied before edge extraction.
pub const EDGE_BLUR_SIGMA: f32 = 1.5;
pub const EDGE_LOW_THRESHOLD: i32 = 50;
pub const EDGE_HIGH_THRESHOLD: i32 = 150;

/// Display mode requested by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Show the pipeline output unchanged.
    #[default]
    Raw,
    /// Replace the image with its edge map.
    Edges,
}

impl std::str::FromStr for FilterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(FilterMode::Raw),
            "edges" => Ok(FilterMode::Edges),
            other => Err(anyhow!("unknown filter mode '{}'", other)),
        }
    }
}

/// Display-side image filter applied to published frames before rendering.
///
/// Implementations receive RGBA and must return RGBA of the same dimensions.
/// The renderer treats any error as "show the unfiltered frame".
pub trait DisplayFilter: Send {
    fn name(&self) -> &'static str;

    fn apply(&mut self, pixels: &[u8], width: u32, height: u32, mode: FilterMode)
        -> Result<Vec<u8>>;
}

/// Copies its input regardless of mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl DisplayFilter for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn apply(
        &mut self,
        pixels: &[u8],
        _width: u32,
        _height: u32,
        _mode: FilterMode,
    ) -> Result<Vec<u8>> {
        Ok(pixels.to_vec())
    }
}

/// Canny-style edge highlighter: white edges on black in `Edges` mode,
/// a plain copy in `Raw` mode.
#[derive(Clone, Copy, Debug)]
pub struct EdgeHighlight {
    pub sigma: f32,
    pub low: i32,
    pub high: i32,
}

impl Default for EdgeHighlight {
    fn default() -> Self {
        Self {
            sigma: EDGE_BLUR_SIGMA,
            low: EDGE_LOW_THRESHOLD,
            high: EDGE_HIGH_THRESHOLD,
        }
    }
}

impl DisplayFilter for EdgeHighlight {
    fn name(&self) -> &'static str {
        "edges"
    }

    fn apply(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        mode: FilterMode,
    ) -> Result<Vec<u8>> {
        if mode == FilterMode::Raw {
            return Ok(pixels.to_vec());
        }
        let frame = PackedFrame::try_new(width, height, pixels.to_vec())?;
        let luma = LumaPlane::from_packed(&frame);
        let gray = GrayImage::from_raw(width, height, luma.samples().to_vec())
            .ok_or_else(|| anyhow!("gray buffer does not match {}x{}", width, height))?;
        let blurred = if self.sigma > 0.0 {
            image::imageops::blur(&gray, self.sigma)
        } else {
            gray
        };
        let edges = self.edge_map(blurred.as_raw(), width as usize, height as usize);
        Ok(edges
            .iter()
            .flat_map(|&on| {
                let v = if on { 255 } else { 0 };
                [v, v, v, 255]
            })
            .collect())
    }
}

impl EdgeHighlight {
    /// Sobel gradients, non-maximum suppression, then double threshold with hysteresis.
    fn edge_map(&self, gray: &[u8], w: usize, h: usize) -> Vec<bool> {
        let mut edges = vec![false; w * h];
        if w < 3 || h < 3 {
            return edges;
        }
        let px = |x: usize, y: usize| gray[y * w + x] as i32;

        let mut magnitude = vec![0i32; w * h];
        let mut direction = vec![0u8; w * h];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let gx = px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1)
                    - px(x - 1, y - 1)
                    - 2 * px(x - 1, y)
                    - px(x - 1, y + 1);
                let gy = px(x - 1, y + 1) + 2 * px(x, y + 1) + px(x + 1, y + 1)
                    - px(x - 1, y - 1)
                    - 2 * px(x, y - 1)
                    - px(x + 1, y - 1);
                let i = y * w + x;
                magnitude[i] = gx.abs() + gy.abs();
                direction[i] = quantize_direction(gx, gy);
            }
        }

        // 0 = suppressed, 1 = weak, 2 = strong
        let mut class = vec![0u8; w * h];
        let mut stack = Vec::new();
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let m = magnitude[i];
                if m <= self.low {
                    continue;
                }
                let (a, b) = match direction[i] {
                    0 => (i - 1, i + 1),
                    1 => (i - w - 1, i + w + 1),
                    2 => (i - w, i + w),
                    _ => (i - w + 1, i + w - 1),
                };
                // on a tie along the gradient only the earlier pixel survives
                if m <= magnitude[a] || m < magnitude[b] {
                    continue;
                }
                if m > self.high {
                    class[i] = 2;
                    stack.push(i);
                } else {
                    class[i] = 1;
                }
            }
        }

        while let Some(i) = stack.pop() {
            edges[i] = true;
            let (x, y) = (i % w, i / w);
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if class[n] == 1 {
                        class[n] = 2;
                        stack.push(n);
                    }
                }
            }
        }
        edges
    }
}

/// Gradient direction bucket (y down): 0 horizontal, 1 down-right, 2 vertical, 3 down-left.
fn quantize_direction(gx: i32, gy: i32) -> u8 {
    let angle = (gy as f32).atan2(gx as f32).to_degrees();
    let angle = if angle < 0.0 { angle + 180.0 } else { angle };
    if !(22.5..157.5).contains(&angle) {
        0
    } else if angle < 67.5 {
        1
    } else if angle < 112.5 {
        2
    } else {
        3
    }
}

/// Apply `filter`, falling back to the unfiltered pixels on any failure.
pub fn apply_or_passthrough<'a>(
    filter: &mut dyn DisplayFilter,
    pixels: &'a [u8],
    width: u32,
    height: u32,
    mode: FilterMode,
) -> Cow<'a, [u8]> {
    let expected = packed_len(width, height);
    if pixels.len() != expected {
        log::warn!(
            "display filter input is {} bytes, expected {}; skipping filter",
            pixels.len(),
            expected
        );
        return Cow::Borrowed(pixels);
    }
    match filter.apply(pixels, width, height, mode) {
        Ok(out) if out.len() == expected => Cow::Owned(out),
        Ok(out) => {
            log::warn!(
                "{} filter returned {} bytes for {}x{}; using unfiltered frame",
                filter.name(),
                out.len(),
                width,
                height
            );
            Cow::Borrowed(pixels)
        }
        Err(e) => {
            log::warn!("{} filter failed: {}; using unfiltered frame", filter.name(), e);
            Cow::Borrowed(pixels)
        }
    }
}
