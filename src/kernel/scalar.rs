//! Direct spatial-domain correlation.

/// Plain dot product of two equally long slices.
#[inline]
pub(crate) fn dot_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(feature = "simd")]
    {
        crate::kernel::simd::dot_simd(a, b)
    }
    #[cfg(not(feature = "simd"))]
    {
        dot_scalar(a, b)
    }
}

/// Unnormalized correlation of two zero-mean `w`×`w` windows over every lag.
///
/// `out[(dy + w - 1) * (2w - 1) + (dx + w - 1)] = Σ a(x, y) · b(x + dx, y + dy)`
/// over the overlapping support.
pub(crate) fn correlate_direct(a: &[f32], b: &[f32], w: usize, out: &mut [f32]) {
    let side = 2 * w - 1;
    let wi = w as isize;
    for (r, out_row) in out.chunks_exact_mut(side).take(side).enumerate() {
        let dy = r as isize - (wi - 1);
        let ya0 = (-dy).max(0) as usize;
        let ya1 = (wi - dy).min(wi) as usize;
        for (c, dst) in out_row.iter_mut().enumerate() {
            let dx = c as isize - (wi - 1);
            let xa0 = (-dx).max(0) as usize;
            let xa1 = (wi - dx).min(wi) as usize;
            let xb0 = (xa0 as isize + dx) as usize;
            let len = xa1 - xa0;
            let mut acc = 0.0f32;
            for ya in ya0..ya1 {
                let yb = (ya as isize + dy) as usize;
                let ra = &a[ya * w + xa0..ya * w + xa0 + len];
                let rb = &b[yb * w + xb0..yb * w + xb0 + len];
                acc += dot(ra, rb);
            }
            *dst = acc;
        }
    }
}
