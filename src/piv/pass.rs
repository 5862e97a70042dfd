//! One pass of the multi-pass loop.

use crate::field::{FieldVector, PassSummary, VectorField, VectorStatus};
use crate::grid::{resample_field, Grid, Predictor};
use crate::image::ImageView;
use crate::kernel::{CorrelationBackend, CorrelationSurface};
use crate::peak::{estimate_peak, PeakConfig, PeakEstimate};
use crate::piv::PivConfig;
use crate::trace::trace_event;
use crate::util::{PivError, PivResult};
use crate::validate::validate_field;
use crate::window::{extract_window_deformed_masked, Deformation, WindowBatch};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Residual normalization in pixels.
const RESIDUAL_SCALE: f32 = 0.5;

pub(crate) struct PassInput<'a, 'img> {
    pub index: usize,
    pub grid: &'a Grid,
    pub previous: Option<(&'a Grid, &'a VectorField)>,
    pub frames: (ImageView<'img, f32>, ImageView<'img, f32>),
    pub chunk: usize,
}

pub(crate) struct PassOutcome {
    pub field: VectorField,
    pub summary: PassSummary,
    /// RMS difference between predictor and validated field; `None` on the
    /// first pass.
    pub change: Option<f32>,
}

pub(crate) fn run_pass<B: CorrelationBackend>(
    input: PassInput<'_, '_>,
    cfg: &PivConfig,
    backend: &B,
    batch: &mut WindowBatch,
) -> PivResult<PassOutcome> {
    let grid = input.grid;
    let predictor = match input.previous {
        None => Predictor::zero(grid),
        Some((prev_grid, prev_field)) => {
            let mut p = resample_field(prev_grid, prev_field, grid, cfg.interpolation)?;
            if let Some(strength) = cfg.smoothing {
                p.smooth(strength);
            }
            if cfg.deform {
                p.compute_gradients(grid.spacing());
            }
            p
        }
    };

    let estimates = measure(grid, &predictor, input.frames, input.chunk, cfg, backend, batch)?;

    let mut vectors = Vec::with_capacity(grid.len());
    let mut degenerate = 0usize;
    let mut residual_sq = 0.0f64;
    let mut measured = 0usize;
    for (est, &(px, py)) in estimates.iter().zip(predictor.shifts()) {
        if est.degenerate {
            degenerate += 1;
            vectors.push(FieldVector {
                dx: px,
                dy: py,
                snr: 0.0,
                status: VectorStatus {
                    unresolved: true,
                    ..VectorStatus::default()
                },
            });
            continue;
        }
        residual_sq += f64::from(est.dx * est.dx + est.dy * est.dy);
        measured += 1;
        vectors.push(FieldVector {
            dx: px + est.dx,
            dy: py + est.dy,
            snr: est.snr,
            status: VectorStatus::measured(est.low_confidence),
        });
    }
    let mut field = VectorField::from_vectors(grid.rows(), grid.cols(), vectors)?;
    let residual = if measured == 0 {
        0.0
    } else {
        (residual_sq / measured as f64).sqrt() as f32 / RESIDUAL_SCALE
    };
    trace_event!(
        "pass_residual",
        pass = input.index,
        residual = residual,
        degenerate = degenerate
    );

    let mut summary = PassSummary {
        pass: input.index,
        window_size: grid.window_size(),
        overlap: grid.overlap(),
        spacing: grid.spacing(),
        rows: grid.rows(),
        cols: grid.cols(),
        residual,
        degenerate,
        ..PassSummary::default()
    };

    if !(input.index == 0 && cfg.trust_first_pass) {
        let (_, report) = validate_field(&mut field, &cfg.validation)?;
        summary.invalid = report.invalid();
        summary.replaced = report.replaced;
        summary.unresolved = report.unresolved.len();
    } else {
        summary.unresolved = field.unresolved().len();
    }

    let change = input.previous.map(|_| rms_change(&field, &predictor));
    Ok(PassOutcome {
        field,
        summary,
        change,
    })
}

/// Extracts, correlates and scores every window of `grid`, one chunk of at
/// most `chunk` pairs at a time.
fn measure<B: CorrelationBackend>(
    grid: &Grid,
    predictor: &Predictor,
    frames: (ImageView<'_, f32>, ImageView<'_, f32>),
    chunk: usize,
    cfg: &PivConfig,
    backend: &B,
    batch: &mut WindowBatch,
) -> PivResult<Vec<PeakEstimate>> {
    let ws = grid.window_size();
    let total = grid.len();
    let chunk = chunk.max(1);
    let mut estimates = Vec::with_capacity(total);

    let mut start = 0;
    while start < total {
        let end = (start + chunk).min(total);
        batch.reset(ws, end - start);
        fill_batch(grid, predictor, frames, start, cfg, batch)?;
        let surfaces = backend.correlate_batch(batch)?;
        if surfaces.len() != batch.len() {
            return Err(PivError::AcceleratorResource {
                requested: batch.len(),
                capacity: surfaces.len(),
            });
        }
        estimates.extend(estimate_all(&surfaces, &cfg.peak, cfg.parallel));
        start = end;
    }
    Ok(estimates)
}

/// Samples both windows of one pair onto a shared support mask.
fn fill_pair(
    frames: (ImageView<'_, f32>, ImageView<'_, f32>),
    center: (f32, f32),
    deformation: &Deformation,
    factors: (f32, f32),
    size: usize,
    out: (&mut [f32], &mut [f32], &mut [bool]),
) -> PivResult<()> {
    let (wa, wb, support) = out;
    extract_window_deformed_masked(frames.0, center, deformation, factors.0, size, wa, support)?;
    extract_window_deformed_masked(frames.1, center, deformation, factors.1, size, wb, support)
}

fn fill_batch(
    grid: &Grid,
    predictor: &Predictor,
    frames: (ImageView<'_, f32>, ImageView<'_, f32>),
    start: usize,
    cfg: &PivConfig,
    batch: &mut WindowBatch,
) -> PivResult<()> {
    let ws = grid.window_size();
    let area = ws * ws;
    let factors = cfg.shift_scheme.factors();
    let (a_buf, b_buf, support) = batch.buffers_mut();

    let fill = |k: usize, (wa, wb): (&mut [f32], &mut [f32]), sm: &mut [bool]| {
        let index = start + k;
        fill_pair(
            frames,
            grid.center_of(index),
            &predictor.deformation(index),
            factors,
            ws,
            (wa, wb, sm),
        )
    };

    #[cfg(feature = "rayon")]
    if cfg.parallel {
        return a_buf
            .par_chunks_exact_mut(area)
            .zip(b_buf.par_chunks_exact_mut(area))
            .zip(support.par_chunks_exact_mut(area))
            .enumerate()
            .try_for_each(|(k, (pair, sm))| fill(k, pair, sm));
    }

    a_buf
        .chunks_exact_mut(area)
        .zip(b_buf.chunks_exact_mut(area))
        .zip(support.chunks_exact_mut(area))
        .enumerate()
        .try_for_each(|(k, (pair, sm))| fill(k, pair, sm))
}

fn estimate_all(
    surfaces: &[CorrelationSurface],
    peak: &PeakConfig,
    parallel: bool,
) -> Vec<PeakEstimate> {
    #[cfg(feature = "rayon")]
    if parallel {
        return surfaces.par_iter().map(|s| estimate_peak(s, peak)).collect();
    }
    let _ = parallel;
    surfaces.iter().map(|s| estimate_peak(s, peak)).collect()
}

/// RMS of `field - predictor` over the usable cells.
fn rms_change(field: &VectorField, predictor: &Predictor) -> f32 {
    let (sum, n) = field
        .as_slice()
        .iter()
        .zip(predictor.shifts())
        .filter(|(v, _)| v.status.is_usable())
        .fold((0.0f64, 0usize), |(s, n), (v, &(px, py))| {
            let (du, dv) = (v.dx - px, v.dy - py);
            (s + f64::from(du * du + dv * dv), n + 1)
        });
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::rms_change;
    use crate::field::VectorField;
    use crate::grid::{Grid, Predictor};

    #[test]
    fn change_against_zero_predictor() {
        let grid = Grid::new(32, 32, 16, 0.0).unwrap();
        let mut field = VectorField::zeros(grid.rows(), grid.cols());
        for v in field.as_mut_slice() {
            v.dx = 3.0;
            v.dy = 4.0;
        }
        let change = rms_change(&field, &Predictor::zero(&grid));
        assert!((change - 5.0).abs() < 1e-6);
    }
}
