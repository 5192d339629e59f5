//! YUV 4:2:0 to RGBA conversion.

use anyhow::Result;

use crate::frame::{packed_len, try_alloc, PackedFrame, RawFrame, CHANNELS};

const CR_TO_R: f32 = 1.370705;
const CB_TO_G: f32 = 0.337633;
const CR_TO_G: f32 = 0.698001;
const CB_TO_B: f32 = 1.732446;

/// Convert a raw 4:2:0 frame (planar or interleaved chroma) to packed RGBA.
///
/// Chroma is sampled at `(y / 2, x / 2)` through each plane's own row and
/// sample strides, so I420, NV12 and NV21 buffers all go through the same path.
/// The only failure is output allocation.
pub fn convert(raw: &RawFrame) -> Result<PackedFrame> {
    let (w, h) = (raw.width() as usize, raw.height() as usize);
    let mut rgba = try_alloc(packed_len(raw.width(), raw.height()))?;
    let (luma, cb, cr) = (raw.luma(), raw.cb(), raw.cr());

    for y in 0..h {
        for x in 0..w {
            let l = luma.sample(y, x) as f32;
            let u = cb.sample(y / 2, x / 2) as f32 - 128.0;
            let v = cr.sample(y / 2, x / 2) as f32 - 128.0;

            let offset = (y * w + x) * CHANNELS;
            rgba[offset] = clamp_to_u8(l + CR_TO_R * v);
            rgba[offset + 1] = clamp_to_u8(l - CB_TO_G * u - CR_TO_G * v);
            rgba[offset + 2] = clamp_to_u8(l + CB_TO_B * u);
            rgba[offset + 3] = 255;
        }
    }

    Ok(PackedFrame::new(raw.width(), raw.height(), rgba))
}

/// Truncate toward zero, then clamp.
fn clamp_to_u8(value: f32) -> u8 {
    value.trunc().clamp(0.0, 255.0) as u8
}
