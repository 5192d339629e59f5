//! Synthetic jittery camera.
//!
//! Produces YUV 4:2:0 frames of a fixed textured scene, displaced each frame
//! by a random whole-pixel offset to imitate hand shake. Row strides are padded
//! to 16 bytes the way camera HALs commonly deliver them.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::frame::{Plane, RawFrame};

const ROW_ALIGN: usize = 16;

/// How the two chroma planes are laid out in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChromaLayout {
    /// I420: separate U and V planes, sample stride 1.
    #[default]
    Planar,
    /// NV12: one UV plane, sample stride 2.
    Interleaved,
}

impl std::str::FromStr for ChromaLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planar" | "i420" => Ok(ChromaLayout::Planar),
            "interleaved" | "nv12" => Ok(ChromaLayout::Interleaved),
            other => Err(anyhow!("unknown chroma layout '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Frames per second; sets the timestamp spacing.
    pub fps: u32,
    /// Maximum shake per frame, in pixels, on each axis.
    pub jitter_px: u32,
    pub layout: ChromaLayout,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            jitter_px: 4,
            layout: ChromaLayout::Planar,
            seed: 7,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    frame_count: u64,
    last_jitter: (i64, i64),
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticStats {
    pub frames_generated: u64,
    pub last_jitter: (i64, i64),
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        if config.fps == 0 {
            return Err(anyhow!("synthetic source fps must be >= 1"));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            frame_count: 0,
            last_jitter: (0, 0),
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Synthetic sources are always "connected".
    pub fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected ({}x{} @ {} fps, {:?} chroma, jitter ±{}px)",
            self.config.width,
            self.config.height,
            self.config.fps,
            self.config.layout,
            self.config.jitter_px
        );
        Ok(())
    }

    /// Nanoseconds between consecutive frames.
    pub fn frame_interval_ns(&self) -> u64 {
        1_000_000_000 / self.config.fps as u64
    }

    /// Offset applied to the most recent frame.
    pub fn last_jitter(&self) -> (i64, i64) {
        self.last_jitter
    }

    pub fn next_frame(&mut self) -> Result<RawFrame> {
        let j = self.config.jitter_px as i64;
        let jitter = if j == 0 {
            (0, 0)
        } else {
            (self.rng.gen_range(-j..=j), self.rng.gen_range(-j..=j))
        };
        let frame = self.render(jitter)?;
        self.frame_count += 1;
        self.last_jitter = jitter;
        Ok(frame)
    }

    /// Render the scene displaced by `(dx, dy)`.
    pub fn render(&self, (dx, dy): (i64, i64)) -> Result<RawFrame> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));

        let luma_stride = align(w);
        let mut luma = vec![0u8; luma_stride * h];
        for y in 0..h {
            for x in 0..w {
                luma[y * luma_stride + x] = texture(x as i64 - dx, y as i64 - dy);
            }
        }

        let chroma = |cx: usize, cy: usize| {
            let sx = cx as i64 - dx / 2;
            let sy = cy as i64 - dy / 2;
            let u = 100 + sx.rem_euclid(56) as u8;
            let v = 150 - sy.rem_euclid(40) as u8;
            (u, v)
        };

        let (cb, cr) = match self.config.layout {
            ChromaLayout::Planar => {
                let stride = align(cw);
                let mut u_plane = vec![128u8; stride * ch];
                let mut v_plane = vec![128u8; stride * ch];
                for cy in 0..ch {
                    for cx in 0..cw {
                        let (u, v) = chroma(cx, cy);
                        u_plane[cy * stride + cx] = u;
                        v_plane[cy * stride + cx] = v;
                    }
                }
                (Plane::new(u_plane, stride, 1), Plane::new(v_plane, stride, 1))
            }
            ChromaLayout::Interleaved => {
                let stride = align(cw * 2);
                let mut uv = vec![128u8; stride * ch];
                for cy in 0..ch {
                    for cx in 0..cw {
                        let (u, v) = chroma(cx, cy);
                        uv[cy * stride + cx * 2] = u;
                        uv[cy * stride + cx * 2 + 1] = v;
                    }
                }
                // Same buffer viewed from byte 1, as camera APIs expose NV12's V plane.
                let v_view = uv[1..].to_vec();
                (Plane::new(uv, stride, 2), Plane::new(v_view, stride, 2))
            }
        };

        RawFrame::new(
            self.config.width,
            self.config.height,
            Plane::new(luma, luma_stride, 1),
            cb,
            cr,
            self.frame_count * self.frame_interval_ns(),
        )
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_generated: self.frame_count,
            last_jitter: self.last_jitter,
        }
    }
}

/// Scene luma. Values do not repeat within a 36px span at 4px spacing, so
/// block matching has one unambiguous answer for shifts up to 16px.
fn texture(sx: i64, sy: i64) -> u8 {
    let fx = sx.div_euclid(4).rem_euclid(9);
    let fy = sy.div_euclid(4).rem_euclid(9);
    (30 + 2 * (fx + 9 * fy)) as u8
}

fn align(len: usize) -> usize {
    len.div_ceil(ROW_ALIGN) * ROW_ALIGN
}
