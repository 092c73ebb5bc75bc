//! Morton code spatial sorting
//!
//! Interleaved-bit keys over quantized 3D positions. Sorting triangles
//! by the Morton code of their centroid walks a space-filling curve, so
//! contiguous runs of the sorted order are spatially coherent - the
//! basis for both leaf clustering and cluster grouping.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;

/// Spread the low 10 bits of `v` so each lands 3 positions apart
#[inline]
fn expand_bits(v: u32) -> u32 {
    let mut v = v;
    v = (v | (v << 16)) & 0x0300_00FF;
    v = (v | (v << 8)) & 0x0300_F00F;
    v = (v | (v << 4)) & 0x030C_30C3;
    v = (v | (v << 2)) & 0x0924_9249;
    v
}

/// 30-bit Morton code for a position normalized to [0, 1] per axis
///
/// Each coordinate is clamped and quantized to 10 bits, then the bits
/// are interleaved x/y/z. Out-of-range inputs clamp rather than wrap.
#[inline]
pub fn morton_encode(normalized: Vec3) -> u32 {
    let x = (normalized.x * 1023.0).clamp(0.0, 1023.0) as u32;
    let y = (normalized.y * 1023.0).clamp(0.0, 1023.0) as u32;
    let z = (normalized.z * 1023.0).clamp(0.0, 1023.0) as u32;
    expand_bits(x) | (expand_bits(y) << 1) | (expand_bits(z) << 2)
}
