//! Quarter-turn rotation of packed frames.

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::frame::{packed_len, try_alloc, PackedFrame, CHANNELS};

/// Clockwise rotation by a multiple of 90 degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map an angle in degrees to a rotation. Only exact quarter turns are
    /// accepted, after normalization into `[0, 360)`.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(anyhow!(
                "rotation must be a multiple of 90 degrees, got {}",
                degrees
            )),
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Dimensions after rotating a `width` x `height` frame.
    pub fn output_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::Deg90 | Rotation::Deg270 => (height, width),
            Rotation::Deg0 | Rotation::Deg180 => (width, height),
        }
    }
}

/// Rotate `frame` clockwise into a freshly allocated buffer.
pub fn rotate(frame: &PackedFrame, rotation: Rotation) -> Result<PackedFrame> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let (out_w, out_h) = rotation.output_dimensions(frame.width(), frame.height());
    if rotation == Rotation::Deg0 {
        let mut out = try_alloc(frame.pixels().len())?;
        out.copy_from_slice(frame.pixels());
        return Ok(PackedFrame::new(out_w, out_h, out));
    }

    let src = frame.pixels();
    let mut out = try_alloc(packed_len(out_w, out_h))?;
    let ow = out_w as usize;

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                Rotation::Deg90 => (h - 1 - y, x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (y, w - 1 - x),
                Rotation::Deg0 => (x, y),
            };
            let s = (y * w + x) * CHANNELS;
            let d = (dy * ow + dx) * CHANNELS;
            out[d..d + CHANNELS].copy_from_slice(&src[s..s + CHANNELS]);
        }
    }

    Ok(PackedFrame::new(out_w, out_h, out))
}

// ----------------------------------------------------------------------------
// Orientation source and correction
// ----------------------------------------------------------------------------

/// Sensor and device orientation, queried once per frame.
pub trait OrientationSource: Send {
    /// Clockwise angle the sensor is mounted at, in degrees.
    fn sensor_degrees(&self) -> i32;

    /// Current device rotation from its natural orientation, in degrees.
    fn device_degrees(&self) -> i32;
}

/// Orientation that never changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FixedOrientation {
    pub sensor_degrees: i32,
    pub device_degrees: i32,
}

impl OrientationSource for FixedOrientation {
    fn sensor_degrees(&self) -> i32 {
        self.sensor_degrees
    }

    fn device_degrees(&self) -> i32 {
        self.device_degrees
    }
}

/// Derives the output rotation from sensor/device orientation plus a fixed
/// mounting offset for the hardware in use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrientationCorrector {
    mounting_offset: i32,
}

impl OrientationCorrector {
    pub fn new(mounting_offset_degrees: i32) -> Result<Self> {
        Rotation::from_degrees(mounting_offset_degrees)?;
        Ok(Self {
            mounting_offset: mounting_offset_degrees.rem_euclid(360),
        })
    }

    pub fn mounting_offset(&self) -> i32 {
        self.mounting_offset
    }

    /// `(sensor - device) mod 360`, then shifted by the mounting offset.
    pub fn rotation_for(&self, sensor_degrees: i32, device_degrees: i32) -> Result<Rotation> {
        let relative = (sensor_degrees - device_degrees).rem_euclid(360);
        Rotation::from_degrees(relative + self.mounting_offset)
    }

    /// Query `source` and rotate `frame` accordingly.
    pub fn correct(
        &self,
        frame: &PackedFrame,
        source: &dyn OrientationSource,
    ) -> Result<PackedFrame> {
        let rotation = self.rotation_for(source.sensor_degrees(), source.device_degrees())?;
        rotate(frame, rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x2 frame; every pixel tagged with its index.
    fn indexed() -> PackedFrame {
        let pixels = (0..6u8).flat_map(|i| [i, i, i, 255]).collect();
        PackedFrame::new(3, 2, pixels)
    }

    fn tags(frame: &PackedFrame) -> Vec<u8> {
        frame.pixels().chunks_exact(4).map(|px| px[0]).collect()
    }

    #[test]
    fn zero_is_identity_copy() -> Result<()> {
        let out = rotate(&indexed(), Rotation::Deg0)?;
        assert_eq!(out, indexed());
        Ok(())
    }

    #[test]
    fn quarter_turn_clockwise_swaps_dimensions() -> Result<()> {
        // 0 1 2      3 0
        // 3 4 5  ->  4 1
        //            5 2
        let out = rotate(&indexed(), Rotation::Deg90)?;
        assert_eq!((out.width(), out.height()), (2, 3));
        assert_eq!(tags(&out), vec![3, 0, 4, 1, 5, 2]);
        Ok(())
    }

    #[test]
    fn half_turn_reverses() -> Result<()> {
        let out = rotate(&indexed(), Rotation::Deg180)?;
        assert_eq!((out.width(), out.height()), (3, 2));
        assert_eq!(tags(&out), vec![5, 4, 3, 2, 1, 0]);
        Ok(())
    }

    #[test]
    fn three_quarter_turn() -> Result<()> {
        // 0 1 2      2 5
        // 3 4 5  ->  1 4
        //            0 3
        let out = rotate(&indexed(), Rotation::Deg270)?;
        assert_eq!((out.width(), out.height()), (2, 3));
        assert_eq!(tags(&out), vec![2, 5, 1, 4, 0, 3]);
        Ok(())
    }

    #[test]
    fn ninety_then_two_seventy_round_trips() -> Result<()> {
        let there = rotate(&indexed(), Rotation::Deg90)?;
        let back = rotate(&there, Rotation::Deg270)?;
        assert_eq!(back, indexed());

        let mut spun = indexed();
        for _ in 0..4 {
            spun = rotate(&spun, Rotation::Deg90)?;
        }
        assert_eq!(spun, indexed());
        Ok(())
    }

    #[test]
    fn from_degrees_rejects_non_quarter_turns() {
        assert!(Rotation::from_degrees(45).is_err());
        assert!(Rotation::from_degrees(91).is_err());
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Deg90);
    }

    #[test]
    fn mounting_offset_is_applied_after_normalization() -> Result<()> {
        let corrector = OrientationCorrector::new(180)?;
        assert_eq!(corrector.rotation_for(90, 0)?, Rotation::Deg270);
        assert_eq!(corrector.rotation_for(90, 270)?, Rotation::Deg0);
        assert_eq!(corrector.rotation_for(0, 90)?, Rotation::Deg90);

        let plain = OrientationCorrector::default();
        assert_eq!(plain.rotation_for(270, 0)?, Rotation::Deg270);
        Ok(())
    }

    #[test]
    fn corrector_rejects_bad_offsets_and_orientations() {
        assert!(OrientationCorrector::new(30).is_err());
        let corrector = OrientationCorrector::default();
        assert!(corrector.rotation_for(90, 45).is_err());
    }

    #[test]
    fn correct_queries_source() -> Result<()> {
        let corrector = OrientationCorrector::default();
        let source = FixedOrientation {
            sensor_degrees: 90,
            device_degrees: 0,
        };
        let out = corrector.correct(&indexed(), &source)?;
        assert_eq!((out.width(), out.height()), (2, 3));
        Ok(())
    }
}
