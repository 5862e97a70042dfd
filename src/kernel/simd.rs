//! SIMD dot product using the `wide` crate.
//!
//! The direct correlator spends nearly all of its time in overlapping row
//! segments; this processes 8 samples at a time with `f32x8` and finishes
//! the tail with scalar code.

use wide::f32x8;

const LANES: usize = 8;

/// Load 8 f32 values into f32x8.
#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// Horizontal sum of f32x8.
#[inline]
fn hsum(v: f32x8) -> f32 {
    let arr = v.to_array();
    arr[0] + arr[1] + arr[2] + arr[3] + arr[4] + arr[5] + arr[6] + arr[7]
}

/// Dot product of two equally long slices.
#[inline]
pub(crate) fn dot_simd(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let simd_end = len / LANES * LANES;
    let mut acc = f32x8::ZERO;
    let mut i = 0;
    while i < simd_end {
        acc += load_f32x8(&a[i..i + LANES]) * load_f32x8(&b[i..i + LANES]);
        i += LANES;
    }
    let mut tail = 0.0f32;
    for j in simd_end..len {
        tail += a[j] * b[j];
    }
    hsum(acc) + tail
}

#[cfg(test)]
mod tests {
    use super::dot_simd;
    use crate::kernel::scalar::dot_scalar;

    #[test]
    fn simd_dot_matches_scalar() {
        for len in [0usize, 3, 8, 13, 32, 61] {
            let a: Vec<f32> = (0..len).map(|i| (i as f32 * 0.37).sin()).collect();
            let b: Vec<f32> = (0..len).map(|i| (i as f32 * 0.11).cos()).collect();
            let s = dot_scalar(&a, &b);
            let v = dot_simd(&a, &b);
            assert!((s - v).abs() < 1e-4, "len {len}: {s} vs {v}");
        }
    }
}
