//! Batched normalized cross-correlation.
//!
//! Every window pair is correlated independently: both windows are made
//! zero-mean, correlated over all lags in `[-(w-1), w-1]`, and divided by
//! `sqrt(Σa'² · Σb'²)` so scores lie in `[-1, 1]` regardless of local
//! illumination. The direct and FFT paths fill the same `(2w-1)²` surface.
//!
//! The [`CorrelationBackend`] trait is the seam to the parallel executor: it
//! only promises that one `correlate_batch` call returns one surface per pair
//! and advertises the largest batch it can hold.

use crate::util::{PivError, PivResult};
use crate::window::{WindowBatch, WindowPair};

mod backend;
pub(crate) mod fft;
pub(crate) mod scalar;

#[cfg(feature = "simd")]
pub(crate) mod simd;

#[cfg(feature = "rayon")]
pub(crate) mod rayon;

pub use backend::CpuBackend;

/// Windows whose per-pixel variance falls below this are treated as blank.
pub(crate) const MIN_WINDOW_VARIANCE: f64 = 1e-8;

/// Windows up to this size use direct correlation in [`CorrelationMode::Auto`].
pub const AUTO_DIRECT_MAX_WINDOW: usize = 16;

/// How surfaces are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CorrelationMode {
    /// Spatial-domain sum over every lag.
    Direct,
    /// Transform-domain correlation on a `2w` zero-padded grid.
    Fft,
    /// Direct for windows up to [`AUTO_DIRECT_MAX_WINDOW`], FFT above.
    #[default]
    Auto,
}

impl CorrelationMode {
    /// Resolves `Auto` for a given window size.
    pub fn resolve(self, window_size: usize) -> CorrelationMode {
        match self {
            CorrelationMode::Auto if window_size <= AUTO_DIRECT_MAX_WINDOW => {
                CorrelationMode::Direct
            }
            CorrelationMode::Auto => CorrelationMode::Fft,
            other => other,
        }
    }
}

/// Correlation scores for one window pair over all lags.
///
/// Row `r`, column `c` holds the score for the lag
/// `(dx, dy) = (c - (w - 1), r - (w - 1))`, i.e. frame B displaced by
/// `(dx, dy)` relative to frame A.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationSurface {
    window_size: usize,
    side: usize,
    data: Vec<f32>,
    degenerate: bool,
}

impl CorrelationSurface {
    /// Wraps a computed surface; `data` must hold `(2w-1)²` values.
    pub fn new(window_size: usize, data: Vec<f32>, degenerate: bool) -> PivResult<Self> {
        let side = surface_side(window_size);
        if data.len() != side * side {
            return Err(PivError::BufferTooSmall {
                needed: side * side,
                got: data.len(),
            });
        }
        Ok(Self {
            window_size,
            side,
            data,
            degenerate,
        })
    }

    /// All-zero surface for a pair with a blank window.
    pub fn degenerate(window_size: usize) -> Self {
        let side = surface_side(window_size);
        Self {
            window_size,
            side,
            data: vec![0.0; side * side],
            degenerate: true,
        }
    }

    /// Window size the surface was computed for.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Side length of the square surface.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Index of the zero-lag sample as `(row, col)`.
    pub fn center(&self) -> (usize, usize) {
        (self.window_size - 1, self.window_size - 1)
    }

    /// Row-major scores.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Score at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.side || col >= self.side {
            return None;
        }
        self.data.get(row * self.side + col).copied()
    }

    /// True when either window had zero variance.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }
}

/// Side length of the surface for a window size.
pub fn surface_side(window_size: usize) -> usize {
    (2 * window_size).saturating_sub(1)
}

/// Parallel correlation capability consumed by the pass controller.
pub trait CorrelationBackend {
    /// Largest number of `window_size` pairs one batch call may carry.
    fn max_batch_windows(&self, window_size: usize) -> usize;

    /// Correlates every pair in `batch`, returning surfaces in batch order.
    ///
    /// Fails with [`PivError::AcceleratorResource`] when the batch exceeds
    /// [`Self::max_batch_windows`]; it never truncates.
    fn correlate_batch(&self, batch: &WindowBatch) -> PivResult<Vec<CorrelationSurface>>;
}

/// Writes `src - mean(src)` into `dst` and returns `Σ (src - mean)²`.
pub(crate) fn zero_mean_into(src: &[f32], dst: &mut [f32]) -> f64 {
    let n = src.len().max(1) as f64;
    let mean = src.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let mut energy = 0.0f64;
    for (d, &s) in dst.iter_mut().zip(src) {
        let centered = f64::from(s) - mean;
        energy += centered * centered;
        *d = centered as f32;
    }
    energy
}

/// Like [`zero_mean_into`], with mean and energy taken over the pixels where
/// `support` is set; unsupported pixels are written as zero.
pub(crate) fn zero_mean_masked_into(src: &[f32], support: &[bool], dst: &mut [f32]) -> f64 {
    let (sum, count) = src
        .iter()
        .zip(support)
        .filter(|(_, &inside)| inside)
        .fold((0.0f64, 0usize), |(s, n), (&v, _)| (s + f64::from(v), n + 1));
    if count == 0 {
        dst.fill(0.0);
        return 0.0;
    }
    let mean = sum / count as f64;
    let mut energy = 0.0f64;
    for ((d, &s), &inside) in dst.iter_mut().zip(src).zip(support) {
        if inside {
            let centered = f64::from(s) - mean;
            energy += centered * centered;
            *d = centered as f32;
        } else {
            *d = 0.0;
        }
    }
    energy
}

/// Correlates a single pair of `window_size`² windows outside any batch.
///
/// Plans FFTs on every call; batch work should go through a
/// [`CorrelationBackend`] instead.
pub fn correlate_window_pair(
    a: &[f32],
    b: &[f32],
    window_size: usize,
    mode: CorrelationMode,
) -> PivResult<CorrelationSurface> {
    let area = window_size * window_size;
    if window_size == 0 || a.len() != area || b.len() != area {
        return Err(PivError::BufferTooSmall {
            needed: area,
            got: a.len().min(b.len()),
        });
    }
    let mode = mode.resolve(window_size);
    let plans = match mode {
        CorrelationMode::Fft => Some(fft::FftPlans::new(window_size)),
        _ => None,
    };
    let pair = WindowPair {
        a,
        b,
        size: window_size,
        support: None,
    };
    Ok(correlate_pair(
        pair,
        mode,
        plans.as_ref(),
        &mut PairScratch::default(),
    ))
}

/// Per-worker buffers reused across pairs.
#[derive(Default)]
pub(crate) struct PairScratch {
    a: Vec<f32>,
    b: Vec<f32>,
    fft: fft::FftScratch,
}

/// Correlates one pair with an already resolved mode.
pub(crate) fn correlate_pair(
    pair: WindowPair<'_>,
    mode: CorrelationMode,
    plans: Option<&fft::FftPlans>,
    scratch: &mut PairScratch,
) -> CorrelationSurface {
    let w = pair.size;
    let area = w * w;
    scratch.a.resize(area, 0.0);
    scratch.b.resize(area, 0.0);
    let (energy_a, energy_b, n) = match pair.support {
        Some(support) => (
            zero_mean_masked_into(pair.a, support, &mut scratch.a),
            zero_mean_masked_into(pair.b, support, &mut scratch.b),
            support.iter().filter(|&&inside| inside).count(),
        ),
        None => (
            zero_mean_into(pair.a, &mut scratch.a),
            zero_mean_into(pair.b, &mut scratch.b),
            area,
        ),
    };
    let n = n as f64;
    if n == 0.0 || energy_a / n <= MIN_WINDOW_VARIANCE || energy_b / n <= MIN_WINDOW_VARIANCE {
        return CorrelationSurface::degenerate(w);
    }

    let side = surface_side(w);
    let mut data = vec![0.0f32; side * side];
    match (mode, plans) {
        (CorrelationMode::Fft, Some(plans)) => {
            fft::correlate_fft(&scratch.a, &scratch.b, w, plans, &mut scratch.fft, &mut data)
        }
        _ => scalar::correlate_direct(&scratch.a, &scratch.b, w, &mut data),
    }

    let inv_norm = (1.0 / (energy_a * energy_b).sqrt()) as f32;
    for v in data.iter_mut() {
        *v *= inv_norm;
    }
    CorrelationSurface {
        window_size: w,
        side,
        data,
        degenerate: false,
    }
}
