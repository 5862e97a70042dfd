//! Multi-pass PIV controller.
//!
//! A run walks an ordered schedule of window sizes. The first pass measures
//! displacements from undeformed windows; every later pass resamples the
//! previous validated field onto its own grid, offsets (and optionally
//! deforms) the windows by that predictor, and measures only the residual.
//! Each pass writes a fresh field, so the predictor is never modified while
//! it is being read.

mod cancel;
mod pass;

pub use cancel::CancelToken;

use crate::field::{assemble, FieldMetadata, PivOutput, VectorField};
use crate::grid::{Grid, Interpolation, MIN_WINDOW_SIZE};
use crate::image::ImageView;
use crate::kernel::{CorrelationBackend, CpuBackend};
use crate::peak::PeakConfig;
use crate::trace::{trace_event, trace_span};
use crate::util::{PivError, PivResult};
use crate::validate::ValidationConfig;
use crate::window::WindowBatch;

/// Window size and overlap of one pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassConfig {
    /// Interrogation window side length in pixels.
    pub window_size: usize,
    /// Fraction of the window shared with its neighbour, in `[0, 1)`.
    pub overlap: f32,
}

impl PassConfig {
    /// Creates a pass description.
    pub fn new(window_size: usize, overlap: f32) -> Self {
        Self {
            window_size,
            overlap,
        }
    }
}

/// How the predictor offsets the two windows of a pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShiftScheme {
    /// Frame-A windows stay put; frame-B windows move by the full predictor.
    Forward,
    /// Frame-A windows move by minus half the predictor, frame-B by plus half.
    #[default]
    Central,
}

impl ShiftScheme {
    /// Predictor factors applied to the frame-A and frame-B windows.
    pub fn factors(self) -> (f32, f32) {
        match self {
            ShiftScheme::Forward => (0.0, 1.0),
            ShiftScheme::Central => (-0.5, 0.5),
        }
    }
}

/// Configuration of a PIV run.
#[derive(Clone, Debug, PartialEq)]
pub struct PivConfig {
    /// Ordered pass schedule; window sizes must not increase.
    pub passes: Vec<PassConfig>,
    /// Upper bound on the number of passes taken from `passes`.
    pub max_passes: usize,
    /// Peak fit and SNR settings.
    pub peak: PeakConfig,
    /// Outlier detection and replacement.
    pub validation: ValidationConfig,
    /// Sampling of the predictor on a new grid.
    pub interpolation: Interpolation,
    /// Predictor split between the two frames.
    pub shift_scheme: ShiftScheme,
    /// Deform windows by the predictor's displacement gradient.
    pub deform: bool,
    /// Smoothing weight applied to the predictor between passes; `None`
    /// leaves it as resampled.
    pub smoothing: Option<f32>,
    /// Skip validation on the first pass.
    pub trust_first_pass: bool,
    /// Stop once the RMS predictor correction (px) falls below this.
    pub early_stop_tolerance: Option<f32>,
    /// Windows per backend call; `None` uses the backend maximum.
    pub batch_size: Option<usize>,
    /// Run extraction and peak estimation on the rayon pool when available.
    pub parallel: bool,
    /// Physical units of the output.
    pub metadata: FieldMetadata,
}

impl Default for PivConfig {
    fn default() -> Self {
        Self {
            passes: vec![PassConfig::new(64, 0.5), PassConfig::new(32, 0.5)],
            max_passes: 8,
            peak: PeakConfig::default(),
            validation: ValidationConfig::default(),
            interpolation: Interpolation::Bilinear,
            shift_scheme: ShiftScheme::Central,
            deform: true,
            smoothing: None,
            trust_first_pass: false,
            early_stop_tolerance: None,
            batch_size: None,
            parallel: true,
            metadata: FieldMetadata::default(),
        }
    }
}

impl PivConfig {
    /// Checks the schedule and every threshold.
    pub fn validate(&self) -> PivResult<()> {
        if self.passes.is_empty() {
            return Err(PivError::config("pass schedule is empty"));
        }
        if self.max_passes == 0 {
            return Err(PivError::config("max_passes must be >= 1"));
        }
        for (i, pass) in self.passes.iter().enumerate() {
            if pass.window_size < MIN_WINDOW_SIZE {
                return Err(PivError::config(format!(
                    "pass {i}: window size {} is below the minimum of {MIN_WINDOW_SIZE}",
                    pass.window_size
                )));
            }
            if !pass.overlap.is_finite() || !(0.0..1.0).contains(&pass.overlap) {
                return Err(PivError::config(format!(
                    "pass {i}: overlap {} must lie in [0, 1)",
                    pass.overlap
                )));
            }
        }
        if self
            .passes
            .windows(2)
            .any(|w| w[1].window_size > w[0].window_size)
        {
            return Err(PivError::config("window sizes must not increase between passes"));
        }
        if let Some(tol) = self.early_stop_tolerance {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(PivError::config("early_stop_tolerance must be finite and > 0"));
            }
        }
        if let Some(strength) = self.smoothing {
            if !strength.is_finite() || strength <= 0.0 {
                return Err(PivError::config("smoothing must be finite and > 0"));
            }
        }
        if self.batch_size == Some(0) {
            return Err(PivError::config("batch_size must be >= 1"));
        }
        self.validation.validate()?;
        self.metadata.validate()
    }

    /// Passes that will actually run.
    pub fn effective_passes(&self) -> &[PassConfig] {
        let n = self.passes.len().min(self.max_passes);
        &self.passes[..n]
    }
}

/// Runs the multi-pass pipeline on a correlation backend.
#[derive(Debug)]
pub struct PivProcessor<B = CpuBackend> {
    config: PivConfig,
    backend: B,
}

impl PivProcessor<CpuBackend> {
    /// Creates a processor on the CPU backend.
    pub fn new(config: PivConfig) -> Self {
        let backend = CpuBackend::new().with_parallel(config.parallel);
        Self { config, backend }
    }
}

impl<B: CorrelationBackend> PivProcessor<B> {
    /// Creates a processor on a custom backend.
    pub fn with_backend(config: PivConfig, backend: B) -> Self {
        Self { config, backend }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: PivConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &PivConfig {
        &self.config
    }

    /// Correlation backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Estimates the displacement field from frame `a` to frame `b`.
    pub fn process(&self, a: ImageView<'_, f32>, b: ImageView<'_, f32>) -> PivResult<PivOutput> {
        self.process_with_cancel(a, b, &CancelToken::new())
    }

    /// Like [`Self::process`], checking `cancel` before every pass.
    pub fn process_with_cancel(
        &self,
        a: ImageView<'_, f32>,
        b: ImageView<'_, f32>,
        cancel: &CancelToken,
    ) -> PivResult<PivOutput> {
        let cfg = &self.config;
        cfg.validate()?;
        if !a.same_shape(&b) {
            return Err(PivError::ShapeMismatch {
                a_width: a.width(),
                a_height: a.height(),
                b_width: b.width(),
                b_height: b.height(),
            });
        }

        let grids = cfg
            .effective_passes()
            .iter()
            .map(|p| Grid::new(a.width(), a.height(), p.window_size, p.overlap))
            .collect::<PivResult<Vec<_>>>()?;
        let chunks = grids
            .iter()
            .map(|g| self.chunk_size(g.window_size()))
            .collect::<PivResult<Vec<_>>>()?;

        let _run = trace_span!("piv_run", passes = grids.len()).entered();
        let mut batch = WindowBatch::new();
        let mut previous: Option<(Grid, VectorField)> = None;
        let mut summaries = Vec::with_capacity(grids.len());

        for (index, (grid, &chunk)) in grids.iter().zip(&chunks).enumerate() {
            if cancel.is_cancelled() {
                return Err(PivError::Cancelled { pass: index });
            }
            let _pass = trace_span!(
                "piv_pass",
                pass = index,
                window_size = grid.window_size(),
                windows = grid.len()
            )
            .entered();

            let outcome = pass::run_pass(
                pass::PassInput {
                    index,
                    grid,
                    previous: previous.as_ref().map(|(g, f)| (g, f)),
                    frames: (a, b),
                    chunk,
                },
                cfg,
                &self.backend,
                &mut batch,
            )?;

            let stop = match (cfg.early_stop_tolerance, outcome.change) {
                (Some(tol), Some(change)) => change < tol,
                _ => false,
            };
            summaries.push(outcome.summary);
            previous = Some((*grid, outcome.field));
            if stop {
                trace_event!("early_stop", pass = index);
                break;
            }
        }

        let (grid, field) = previous.ok_or_else(|| PivError::config("no pass was run"))?;
        assemble(grid, field, cfg.metadata, summaries)
    }

    fn chunk_size(&self, window_size: usize) -> PivResult<usize> {
        let capacity = self.backend.max_batch_windows(window_size);
        if capacity == 0 {
            return Err(PivError::AcceleratorResource {
                requested: 1,
                capacity: 0,
            });
        }
        Ok(self.config.batch_size.unwrap_or(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, PassConfig, PivConfig, PivProcessor, ShiftScheme};
    use crate::image::ImageView;
    use crate::kernel::{CorrelationBackend, CorrelationSurface, CpuBackend};
    use crate::util::{PivError, PivResult};
    use crate::window::WindowBatch;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Gaussian particles (sigma 1 px) displaced by `(dx, dy)`.
    fn particles(size: usize, dx: f32, dy: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let span = size as f32 + 16.0;
        let count = (span * span * 0.03) as usize;
        let mut image = vec![0.0f32; size * size];
        for _ in 0..count {
            let px = rng.random_range(-8.0..size as f32 + 8.0) + dx;
            let py = rng.random_range(-8.0..size as f32 + 8.0) + dy;
            let amp: f32 = rng.random_range(100.0..200.0);
            let (cx, cy) = (px.round() as i64, py.round() as i64);
            for y in (cy - 4).max(0)..=(cy + 4).min(size as i64 - 1) {
                for x in (cx - 4).max(0)..=(cx + 4).min(size as i64 - 1) {
                    let (ex, ey) = (x as f32 - px, y as f32 - py);
                    image[y as usize * size + x as usize] +=
                        amp * (-(ex * ex + ey * ey) * 0.5).exp();
                }
            }
        }
        image
    }

    /// CPU backend that cancels `token` on its first batch.
    struct CancelOnFirstBatch {
        inner: CpuBackend,
        token: CancelToken,
    }

    impl CorrelationBackend for CancelOnFirstBatch {
        fn max_batch_windows(&self, window_size: usize) -> usize {
            self.inner.max_batch_windows(window_size)
        }

        fn correlate_batch(&self, batch: &WindowBatch) -> PivResult<Vec<CorrelationSurface>> {
            self.token.cancel();
            self.inner.correlate_batch(batch)
        }
    }

    #[test]
    fn config_validation() {
        assert!(PivConfig::default().validate().is_ok());

        let increasing = PivConfig {
            passes: vec![PassConfig::new(16, 0.5), PassConfig::new(32, 0.5)],
            ..PivConfig::default()
        };
        assert!(matches!(increasing.validate(), Err(PivError::InvalidConfig { .. })));

        let empty = PivConfig {
            passes: Vec::new(),
            ..PivConfig::default()
        };
        assert!(empty.validate().is_err());

        let repeated = PivConfig {
            passes: vec![PassConfig::new(32, 0.5), PassConfig::new(32, 0.5)],
            ..PivConfig::default()
        };
        assert!(repeated.validate().is_ok());

        let smoothing = PivConfig {
            smoothing: Some(0.0),
            ..PivConfig::default()
        };
        assert!(smoothing.validate().is_err());
    }

    #[test]
    fn max_passes_truncates_schedule() {
        let cfg = PivConfig {
            passes: vec![PassConfig::new(64, 0.5), PassConfig::new(32, 0.5)],
            max_passes: 1,
            ..PivConfig::default()
        };
        assert_eq!(cfg.effective_passes().len(), 1);
    }

    #[test]
    fn shift_factors() {
        assert_eq!(ShiftScheme::Forward.factors(), (0.0, 1.0));
        assert_eq!(ShiftScheme::Central.factors(), (-0.5, 0.5));
    }

    #[test]
    fn shape_mismatch_is_reported_first() {
        let a = vec![0.0f32; 64 * 64];
        let b = vec![0.0f32; 64 * 48];
        let va = ImageView::from_slice(&a, 64, 64).unwrap();
        let vb = ImageView::from_slice(&b, 64, 48).unwrap();
        let err = PivProcessor::new(PivConfig::default()).process(va, vb).unwrap_err();
        assert!(matches!(err, PivError::ShapeMismatch { .. }));
    }

    #[test]
    fn oversized_window_fails_before_work() {
        let a = vec![1.0f32; 48 * 48];
        let view = ImageView::from_slice(&a, 48, 48).unwrap();
        let err = PivProcessor::new(PivConfig::default())
            .process(view, view)
            .unwrap_err();
        assert!(matches!(err, PivError::WindowTooLarge { .. }));
    }

    #[test]
    fn cancelled_token_stops_before_first_pass() {
        let a = particles(64, 0.0, 0.0, 1);
        let view = ImageView::from_slice(&a, 64, 64).unwrap();
        let cfg = PivConfig {
            passes: vec![PassConfig::new(32, 0.5)],
            ..PivConfig::default()
        };
        let token = CancelToken::new();
        token.cancel();
        let err = PivProcessor::new(cfg)
            .process_with_cancel(view, view, &token)
            .unwrap_err();
        assert_eq!(err, PivError::Cancelled { pass: 0 });
    }

    #[test]
    fn cancel_during_first_pass_stops_before_second() {
        let a = particles(96, 0.0, 0.0, 4);
        let b = particles(96, 1.0, 0.5, 4);
        let va = ImageView::from_slice(&a, 96, 96).unwrap();
        let vb = ImageView::from_slice(&b, 96, 96).unwrap();
        let cfg = PivConfig {
            passes: vec![PassConfig::new(32, 0.5), PassConfig::new(32, 0.5)],
            ..PivConfig::default()
        };
        let token = CancelToken::new();
        let backend = CancelOnFirstBatch {
            inner: CpuBackend::new(),
            token: token.clone(),
        };
        let err = PivProcessor::with_backend(cfg, backend)
            .process_with_cancel(va, vb, &token)
            .unwrap_err();
        assert_eq!(err, PivError::Cancelled { pass: 1 });
    }

    #[test]
    fn zero_capacity_backend_is_rejected() {
        let a = particles(64, 0.0, 0.0, 1);
        let view = ImageView::from_slice(&a, 64, 64).unwrap();
        let cfg = PivConfig {
            passes: vec![PassConfig::new(32, 0.5)],
            ..PivConfig::default()
        };
        let backend = CpuBackend::new().with_memory_budget(16);
        let err = PivProcessor::with_backend(cfg, backend)
            .process(view, view)
            .unwrap_err();
        assert!(matches!(err, PivError::AcceleratorResource { capacity: 0, .. }));
    }

    #[test]
    fn integer_shift_on_particle_frames() {
        let a = particles(96, 0.0, 0.0, 12);
        let b = particles(96, 3.0, -2.0, 12);
        let va = ImageView::from_slice(&a, 96, 96).unwrap();
        let vb = ImageView::from_slice(&b, 96, 96).unwrap();
        let cfg = PivConfig {
            passes: vec![PassConfig::new(32, 0.5), PassConfig::new(32, 0.5)],
            ..PivConfig::default()
        };
        let out = PivProcessor::new(cfg).process(va, vb).unwrap();
        assert_eq!(out.passes.len(), 2);
        let center = out.field.get(2, 2).unwrap();
        assert!((center.dx - 3.0).abs() < 0.1, "dx {}", center.dx);
        assert!((center.dy + 2.0).abs() < 0.1, "dy {}", center.dy);
    }
}
