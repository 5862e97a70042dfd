//! Peak location, subpixel refinement and signal-to-noise scoring.
//!
//! The displacement of a window pair is the position of the correlation
//! maximum relative to the zero-lag sample. The integer maximum is refined
//! independently along each axis with a three-point fit, and the peak height
//! is compared with the rest of the surface to give an SNR that the
//! validator thresholds.

mod subpixel;

pub use subpixel::{centroid_offset, gaussian_offset, parabolic_offset};

use crate::kernel::CorrelationSurface;

/// Smallest denominator and primary peak height used in SNR ratios.
pub const SNR_FLOOR: f32 = 1e-3;

/// Three-point fit used for subpixel refinement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PeakFit {
    /// Parabola through the log of the samples.
    #[default]
    Gaussian,
    /// Parabola through the samples.
    Parabolic,
    /// Centre of mass of the samples.
    Centroid,
}

impl PeakFit {
    /// Sub-sample offset for three samples around a maximum.
    pub fn offset(self, fm: f32, f0: f32, fp: f32) -> Option<f32> {
        match self {
            PeakFit::Gaussian => gaussian_offset(fm, f0, fp),
            PeakFit::Parabolic => parabolic_offset(fm, f0, fp),
            PeakFit::Centroid => centroid_offset(fm, f0, fp),
        }
    }
}

/// How the primary peak is compared with the rest of the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SnrMethod {
    /// Primary over the highest value outside the exclusion block.
    #[default]
    PeakToPeak,
    /// Primary over the mean of the positive surface values.
    PeakToMean,
}

/// Peak estimator settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakConfig {
    /// Subpixel fit.
    pub fit: PeakFit,
    /// SNR definition.
    pub snr_method: SnrMethod,
    /// Half-size of the block around the primary ignored by `PeakToPeak`.
    pub exclusion_radius: usize,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            fit: PeakFit::Gaussian,
            snr_method: SnrMethod::PeakToPeak,
            exclusion_radius: 2,
        }
    }
}

/// Displacement and quality estimate for one surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PeakEstimate {
    /// Horizontal displacement in pixels.
    pub dx: f32,
    /// Vertical displacement in pixels.
    pub dy: f32,
    /// Correlation score at the integer maximum.
    pub peak: f32,
    /// Signal-to-noise ratio; 0 for unusable surfaces.
    pub snr: f32,
    /// The maximum sat on the surface border and was not refined.
    pub low_confidence: bool,
    /// The surface came from a zero-variance window.
    pub degenerate: bool,
}

/// Locates the correlation maximum of `surface` and scores it.
pub fn estimate_peak(surface: &CorrelationSurface, cfg: &PeakConfig) -> PeakEstimate {
    if surface.is_degenerate() {
        return PeakEstimate {
            degenerate: true,
            ..PeakEstimate::default()
        };
    }

    let side = surface.side();
    let data = surface.data();
    let Some((best_idx, best, min)) = argmax(data) else {
        return PeakEstimate::default();
    };
    if best <= min {
        // flat surface: no preferred lag
        return PeakEstimate::default();
    }

    let row = best_idx / side;
    let col = best_idx % side;
    let (center_row, center_col) = surface.center();
    let border = row == 0 || col == 0 || row + 1 == side || col + 1 == side;

    let (mut sub_x, mut sub_y) = (0.0f32, 0.0f32);
    if !border {
        let at = |r: usize, c: usize| data[r * side + c];
        sub_x = cfg
            .fit
            .offset(at(row, col - 1), best, at(row, col + 1))
            .unwrap_or(0.0);
        sub_y = cfg
            .fit
            .offset(at(row - 1, col), best, at(row + 1, col))
            .unwrap_or(0.0);
    }

    PeakEstimate {
        dx: col as f32 + sub_x - center_col as f32,
        dy: row as f32 + sub_y - center_row as f32,
        peak: best,
        snr: signal_to_noise(data, side, row, col, best, cfg),
        low_confidence: border,
        degenerate: false,
    }
}

/// First maximum in row-major order plus the surface minimum.
fn argmax(data: &[f32]) -> Option<(usize, f32, f32)> {
    let mut best: Option<(usize, f32)> = None;
    let mut min = f32::INFINITY;
    for (i, &v) in data.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        min = min.min(v);
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, v)| (i, v, min))
}

fn signal_to_noise(
    data: &[f32],
    side: usize,
    row: usize,
    col: usize,
    primary: f32,
    cfg: &PeakConfig,
) -> f32 {
    if primary < SNR_FLOOR {
        return 0.0;
    }
    let denom = match cfg.snr_method {
        SnrMethod::PeakToPeak => {
            let radius = cfg.exclusion_radius;
            let mut secondary = f32::NEG_INFINITY;
            for (i, &v) in data.iter().enumerate() {
                let (r, c) = (i / side, i % side);
                if r.abs_diff(row) <= radius && c.abs_diff(col) <= radius {
                    continue;
                }
                if v.is_finite() && v > secondary {
                    secondary = v;
                }
            }
            secondary
        }
        SnrMethod::PeakToMean => {
            let (sum, count) = data
                .iter()
                .filter(|v| v.is_finite() && **v > 0.0)
                .fold((0.0f64, 0usize), |(s, n), &v| (s + f64::from(v), n + 1));
            if count == 0 {
                0.0
            } else {
                (sum / count as f64) as f32
            }
        }
    };
    primary / denom.max(SNR_FLOOR)
}
