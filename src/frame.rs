//! Frame data model.
//!
//! - `RawFrame`: sensor-format luma/chroma planes as delivered by the capture side.
//! - `PackedFrame`: contiguous RGBA buffer, `width * height * 4` bytes, always.
//! - `LumaPlane`: tightly packed luma samples used for motion estimation.
//! - `FrameEnvelope`: the immutable unit exchanged through the `FrameBus`.
//!
//! Dimension and stride mismatches are caller bugs. `RawFrame::new` rejects them
//! at the capture boundary; `PackedFrame::new` panics on them.

use anyhow::{anyhow, Result};

/// Bytes per packed pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// Opaque black, used for pixels uncovered by a warp.
pub const OPAQUE_BLACK: [u8; CHANNELS] = [0, 0, 0, 255];

// ----------------------------------------------------------------------------
// RawFrame: sensor planes
// ----------------------------------------------------------------------------

/// One sample plane of a raw frame.
///
/// `sample_stride` is the byte distance between horizontally adjacent samples:
/// 1 for planar layouts, 2 for interleaved chroma (NV12/NV21).
#[derive(Clone, Debug)]
pub struct Plane {
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub sample_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, sample_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            sample_stride,
        }
    }

    /// A tightly packed plane (`row_stride == width`, `sample_stride == 1`).
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self::new(data, width, 1)
    }

    #[inline]
    pub(crate) fn sample(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.row_stride + col * self.sample_stride]
    }

    fn check(&self, name: &str, cols: usize, rows: usize) -> Result<()> {
        if self.sample_stride == 0 {
            return Err(anyhow!("{} plane sample stride must be > 0", name));
        }
        if cols == 0 || rows == 0 {
            return Ok(());
        }
        let row_span = (cols - 1) * self.sample_stride + 1;
        if self.row_stride < row_span {
            return Err(anyhow!(
                "{} plane row stride {} too small for {} samples at stride {}",
                name,
                self.row_stride,
                cols,
                self.sample_stride
            ));
        }
        let needed = (rows - 1) * self.row_stride + row_span;
        if self.data.len() < needed {
            return Err(anyhow!(
                "{} plane too short: need {} bytes, got {}",
                name,
                needed,
                self.data.len()
            ));
        }
        Ok(())
    }
}

/// Raw sensor frame: a full-resolution luma plane and two half-resolution chroma planes.
///
/// Immutable once constructed and consumed by a single pipeline pass.
#[derive(Debug)]
pub struct RawFrame {
    width: u32,
    height: u32,
    luma: Plane,
    cb: Plane,
    cr: Plane,
    /// Monotonic capture time in nanoseconds.
    timestamp_ns: u64,
}

impl RawFrame {
    /// Build a raw frame, validating every plane against the declared dimensions.
    pub fn new(
        width: u32,
        height: u32,
        luma: Plane,
        cb: Plane,
        cr: Plane,
        timestamp_ns: u64,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("raw frame dimensions must be non-zero"));
        }
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        luma.check("luma", w, h)?;
        cb.check("cb", cw, ch)?;
        cr.check("cr", cw, ch)?;
        Ok(Self {
            width,
            height,
            luma,
            cb,
            cr,
            timestamp_ns,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn luma(&self) -> &Plane {
        &self.luma
    }

    pub fn cb(&self) -> &Plane {
        &self.cb
    }

    pub fn cr(&self) -> &Plane {
        &self.cr
    }
}

// ----------------------------------------------------------------------------
// PackedFrame: RGBA
// ----------------------------------------------------------------------------

/// Packed RGBA frame. The buffer length is always `width * height * 4`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PackedFrame {
    /// Wrap an RGBA buffer.
    ///
    /// # Panics
    ///
    /// Panics if `pixels.len() != width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        let expected = packed_len(width, height);
        assert_eq!(
            pixels.len(),
            expected,
            "packed frame {}x{} needs {} bytes",
            width,
            height,
            expected
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Fallible variant for buffers handed back by external collaborators.
    pub fn try_new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = packed_len(width, height);
        if pixels.len() != expected {
            return Err(anyhow!(
                "packed frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame with every pixel set to `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; CHANNELS]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(packed_len(width, height))
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; CHANNELS] {
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let mut out = [0u8; CHANNELS];
        out.copy_from_slice(&self.pixels[offset..offset + CHANNELS]);
        out
    }
}

/// Byte length of a packed frame with the given dimensions.
pub fn packed_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

/// Allocate a zeroed buffer of `len` bytes, surfacing allocation failure as an error.
pub(crate) fn try_alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| anyhow!("failed to allocate {} byte frame buffer: {}", len, e))?;
    buf.resize(len, 0);
    Ok(buf)
}

// ----------------------------------------------------------------------------
// LumaPlane
// ----------------------------------------------------------------------------

/// Tightly packed luma samples (`width * height` bytes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LumaPlane {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl LumaPlane {
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(anyhow!(
                "luma plane length mismatch: expected {}, got {}",
                expected,
                samples.len()
            ));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Copy the luma plane out of a raw frame, dropping row padding.
    pub fn from_raw(frame: &RawFrame) -> Self {
        let (w, h) = (frame.width as usize, frame.height as usize);
        let plane = frame.luma();
        let mut samples = Vec::with_capacity(w * h);
        for row in 0..h {
            for col in 0..w {
                samples.push(plane.sample(row, col));
            }
        }
        Self {
            width: frame.width,
            height: frame.height,
            samples,
        }
    }

    /// Derive luma from RGBA with integer BT.601 weights.
    pub fn from_packed(frame: &PackedFrame) -> Self {
        let samples = frame
            .pixels()
            .chunks_exact(CHANNELS)
            .map(|px| {
                let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((299 * r + 587 * g + 114 * b) / 1000) as u8
            })
            .collect();
        Self {
            width: frame.width(),
            height: frame.height(),
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> u8 {
        self.samples[y * self.width as usize + x]
    }
}

// ----------------------------------------------------------------------------
// FrameEnvelope
// ----------------------------------------------------------------------------

/// Published pipeline output. Consumers receive it behind an `Arc` and can only read it.
#[derive(Debug)]
pub struct FrameEnvelope {
    id: u64,
    captured_at_ns: u64,
    frame: PackedFrame,
}

impl FrameEnvelope {
    pub fn new(id: u64, captured_at_ns: u64, frame: PackedFrame) -> Self {
        Self {
            id,
            captured_at_ns,
            frame,
        }
    }

    /// Monotonically increasing publish identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn captured_at_ns(&self) -> u64 {
        self.captured_at_ns
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.frame.pixels()
    }

    pub fn frame(&self) -> &PackedFrame {
        &self.frame
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_planes(width: usize, height: usize) -> (Plane, Plane, Plane) {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        (
            Plane::packed(vec![128; width * height], width),
            Plane::packed(vec![128; cw * ch], cw),
            Plane::packed(vec![128; cw * ch], cw),
        )
    }

    #[test]
    fn raw_frame_accepts_padded_strides() {
        let luma = Plane::new(vec![0; 16 * 3 + 4], 16, 1);
        let (_, cb, cr) = gray_planes(4, 4);
        assert!(RawFrame::new(4, 4, luma, cb, cr, 0).is_ok());
    }

    #[test]
    fn raw_frame_rejects_short_plane() {
        let (_, cb, cr) = gray_planes(4, 4);
        let luma = Plane::packed(vec![0; 15], 4);
        let err = RawFrame::new(4, 4, luma, cb, cr, 0).unwrap_err();
        assert!(err.to_string().contains("luma plane too short"));
    }

    #[test]
    fn raw_frame_rejects_row_stride_below_width() {
        let (_, cb, cr) = gray_planes(4, 4);
        let luma = Plane::new(vec![0; 64], 3, 1);
        assert!(RawFrame::new(4, 4, luma, cb, cr, 0).is_err());
    }

    #[test]
    fn raw_frame_rejects_zero_sample_stride() {
        let (luma, _, cr) = gray_planes(4, 4);
        let cb = Plane::new(vec![128; 4], 2, 0);
        assert!(RawFrame::new(4, 4, luma, cb, cr, 0).is_err());
    }

    #[test]
    #[should_panic(expected = "packed frame 2x2 needs 16 bytes")]
    fn packed_frame_panics_on_length_mismatch() {
        let _ = PackedFrame::new(2, 2, vec![0; 15]);
    }

    #[test]
    fn packed_frame_try_new_reports_mismatch() {
        assert!(PackedFrame::try_new(2, 2, vec![0; 12]).is_err());
        assert!(PackedFrame::try_new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn luma_from_raw_strips_padding() {
        let mut data = vec![0u8; 8 * 2];
        data[..3].copy_from_slice(&[1, 2, 3]);
        data[8..11].copy_from_slice(&[4, 5, 6]);
        let luma = Plane::new(data, 8, 1);
        let chroma = || Plane::packed(vec![128; 2], 2);
        let raw = RawFrame::new(3, 2, luma, chroma(), chroma(), 0).unwrap();
        assert_eq!(LumaPlane::from_raw(&raw).samples(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn luma_from_packed_uses_bt601_weights() {
        let frame = PackedFrame::new(2, 1, vec![255, 255, 255, 255, 255, 0, 0, 255]);
        let luma = LumaPlane::from_packed(&frame);
        assert_eq!(luma.samples(), &[255, 76]);
    }
}
