//! CPU implementation of [`CorrelationBackend`].

use crate::kernel::fft::PlanCache;
use crate::kernel::{
    correlate_pair, surface_side, CorrelationBackend, CorrelationMode, CorrelationSurface,
    PairScratch,
};
use crate::trace::trace_span;
use crate::util::{PivError, PivResult};
use crate::window::WindowBatch;

/// Default working-memory budget for one batch.
pub const DEFAULT_MEMORY_BUDGET: usize = 256 * 1024 * 1024;

/// Multi-core correlator.
///
/// Capacity is derived from a memory budget: each pair costs its two windows,
/// its support mask and one surface. Parallel execution needs the `rayon` feature; without it
/// batches run on the calling thread.
pub struct CpuBackend {
    mode: CorrelationMode,
    parallel: bool,
    memory_budget: usize,
    plans: PlanCache,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend")
            .field("mode", &self.mode)
            .field("parallel", &self.parallel)
            .field("memory_budget", &self.memory_budget)
            .finish()
    }
}

impl CpuBackend {
    /// Creates a backend with `Auto` mode, parallelism on, and the default budget.
    pub fn new() -> Self {
        Self {
            mode: CorrelationMode::Auto,
            parallel: true,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            plans: PlanCache::default(),
        }
    }

    /// Selects how surfaces are computed.
    pub fn with_mode(mut self, mode: CorrelationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the per-batch memory budget in bytes.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Configured correlation mode.
    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    /// Whether batches are split across the rayon pool.
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Bytes of working memory one pair of `window_size` needs.
    pub fn bytes_per_window(window_size: usize) -> usize {
        let side = surface_side(window_size);
        let area = window_size * window_size;
        std::mem::size_of::<f32>() * (2 * area + side * side) + std::mem::size_of::<bool>() * area
    }

    fn run(
        &self,
        batch: &WindowBatch,
        mode: CorrelationMode,
        plans: Option<&crate::kernel::fft::FftPlans>,
    ) -> Vec<CorrelationSurface> {
        #[cfg(feature = "rayon")]
        if self.parallel {
            return crate::kernel::rayon::correlate_batch_par(batch, mode, plans);
        }
        let mut scratch = PairScratch::default();
        batch
            .pairs()
            .map(|pair| correlate_pair(pair, mode, plans, &mut scratch))
            .collect()
    }
}

impl CorrelationBackend for CpuBackend {
    fn max_batch_windows(&self, window_size: usize) -> usize {
        self.memory_budget / Self::bytes_per_window(window_size).max(1)
    }

    fn correlate_batch(&self, batch: &WindowBatch) -> PivResult<Vec<CorrelationSurface>> {
        let window_size = batch.window_size();
        let capacity = self.max_batch_windows(window_size);
        if batch.len() > capacity {
            return Err(PivError::AcceleratorResource {
                requested: batch.len(),
                capacity,
            });
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mode = self.mode.resolve(window_size);
        let _span = trace_span!("correlate_batch", windows = batch.len(), window_size).entered();
        let plans = match mode {
            CorrelationMode::Fft => Some(self.plans.get(window_size)),
            _ => None,
        };
        Ok(self.run(batch, mode, plans.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::CpuBackend;
    use crate::kernel::{CorrelationBackend, CorrelationMode};
    use crate::util::PivError;
    use crate::window::WindowBatch;

    fn textured(w: usize, seed: usize) -> Vec<f32> {
        (0..w * w)
            .map(|i| (((i + seed) * 2654435761usize) % 1021) as f32 / 1021.0)
            .collect()
    }

    #[test]
    fn capacity_follows_budget() {
        let per = CpuBackend::bytes_per_window(32);
        assert_eq!(per, 4 * (2 * 32 * 32 + 63 * 63) + 32 * 32);
        let backend = CpuBackend::new().with_memory_budget(per * 10 + 5);
        assert_eq!(backend.max_batch_windows(32), 10);
    }

    #[test]
    fn oversized_batch_fails_without_truncation() {
        let w = 8;
        let a = textured(w, 1);
        let b = textured(w, 2);
        let pairs = vec![(a.as_slice(), b.as_slice()); 3];
        let batch = WindowBatch::from_pairs(w, &pairs).unwrap();
        let backend =
            CpuBackend::new().with_memory_budget(CpuBackend::bytes_per_window(w) * 2);
        let err = backend.correlate_batch(&batch).unwrap_err();
        assert_eq!(
            err,
            PivError::AcceleratorResource {
                requested: 3,
                capacity: 2,
            }
        );
    }

    #[test]
    fn identical_windows_peak_at_zero_lag_with_unit_score() {
        let w = 16;
        let a = textured(w, 7);
        let batch = WindowBatch::from_pairs(w, &[(a.as_slice(), a.as_slice())]).unwrap();
        for mode in [CorrelationMode::Direct, CorrelationMode::Fft] {
            let backend = CpuBackend::new().with_mode(mode).with_parallel(false);
            let surfaces = backend.correlate_batch(&batch).unwrap();
            let surface = &surfaces[0];
            let (r, c) = surface.center();
            let peak = surface.get(r, c).unwrap();
            assert!((peak - 1.0).abs() < 1e-3, "{mode:?}: {peak}");
            assert!(surface.data().iter().all(|&v| v <= peak + 1e-4));
        }
    }

    #[test]
    fn blank_window_is_degenerate() {
        let w = 8;
        let a = textured(w, 3);
        let blank = vec![5.0f32; w * w];
        let batch = WindowBatch::from_pairs(w, &[(a.as_slice(), blank.as_slice())]).unwrap();
        let surfaces = CpuBackend::new().correlate_batch(&batch).unwrap();
        assert!(surfaces[0].is_degenerate());
        assert!(surfaces[0].data().iter().all(|&v| v == 0.0));
    }
}
