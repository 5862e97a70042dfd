//! Three-point subpixel peak fits.
//!
//! Every fit takes samples at `x = -1, 0, +1` (`fm`, `f0`, `fp`) around an
//! integer maximum and returns the sub-sample offset of the peak, or `None`
//! when the fit is ill-conditioned.

const EPS: f32 = 1e-6;

/// Offset of the vertex of the parabola through the three samples.
///
/// Requires a concave fit; the offset lies in `[-1, 1]`.
pub fn parabolic_offset(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if !fm.is_finite() || !f0.is_finite() || !fp.is_finite() {
        return None;
    }

    let denom = fm - 2.0 * f0 + fp;
    if denom.abs() < EPS || denom >= 0.0 {
        return None;
    }

    let dx = 0.5 * (fm - fp) / denom;
    if dx.is_finite() && dx.abs() <= 1.0 {
        Some(dx)
    } else {
        None
    }
}

/// Offset of a Gaussian through the three samples.
///
/// The Gaussian is a parabola in log space, so all three samples must be
/// positive. Non-positive taps fall back to [`parabolic_offset`].
pub fn gaussian_offset(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if fm <= 0.0 || f0 <= 0.0 || fp <= 0.0 {
        return parabolic_offset(fm, f0, fp);
    }
    let (lm, l0, lp) = (fm.ln(), f0.ln(), fp.ln());
    parabolic_offset(lm, l0, lp).or_else(|| parabolic_offset(fm, f0, fp))
}

/// Centre of mass of the three samples, negative taps clipped to zero.
pub fn centroid_offset(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if !fm.is_finite() || !f0.is_finite() || !fp.is_finite() {
        return None;
    }
    let (fm, f0, fp) = (fm.max(0.0), f0.max(0.0), fp.max(0.0));
    let sum = fm + f0 + fp;
    if sum < EPS {
        return None;
    }
    Some((fp - fm) / sum)
}
