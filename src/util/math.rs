//! Small numeric helpers shared by validation and interpolation.

/// Median of `values`, reordering the slice in place.
///
/// Even-length inputs return the mean of the two central elements. Returns
/// `None` for an empty slice.
pub(crate) fn median_in_place(values: &mut [f32]) -> Option<f32> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower_max = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    Some(0.5 * (lower_max + upper))
}

/// Median absolute deviation of `values` around `center`.
///
/// `scratch` is overwritten; it must be at least as long as `values`.
pub(crate) fn median_abs_deviation(values: &[f32], center: f32, scratch: &mut [f32]) -> Option<f32> {
    let dev = &mut scratch[..values.len()];
    for (d, &v) in dev.iter_mut().zip(values) {
        *d = (v - center).abs();
    }
    median_in_place(dev)
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
