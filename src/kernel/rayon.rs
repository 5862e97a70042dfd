//! Rayon-parallel batch correlation (feature-gated).
//!
//! Pairs are independent, so the batch is split across the pool with one
//! scratch set per worker. Output order matches batch order.

use crate::kernel::fft::FftPlans;
use crate::kernel::{correlate_pair, CorrelationMode, CorrelationSurface, PairScratch};
use crate::window::{WindowBatch, WindowPair};
use rayon::prelude::*;

/// Correlates every pair of `batch` on the rayon pool.
pub(crate) fn correlate_batch_par(
    batch: &WindowBatch,
    mode: CorrelationMode,
    plans: Option<&FftPlans>,
) -> Vec<CorrelationSurface> {
    let pairs: Vec<WindowPair<'_>> = batch.pairs().collect();
    pairs
        .par_iter()
        .map_init(PairScratch::default, |scratch, &pair| {
            correlate_pair(pair, mode, plans, scratch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::correlate_batch_par;
    use crate::kernel::{correlate_pair, CorrelationMode, PairScratch};
    use crate::window::WindowBatch;

    #[test]
    fn parallel_matches_sequential() {
        let w = 8;
        let windows: Vec<Vec<f32>> = (0..6)
            .map(|k| {
                (0..w * w)
                    .map(|i| (((i + 3 * k) * 13) % 17) as f32)
                    .collect()
            })
            .collect();
        let pairs: Vec<(&[f32], &[f32])> = windows
            .iter()
            .zip(windows.iter().rev())
            .map(|(a, b)| (a.as_slice(), b.as_slice()))
            .collect();
        let batch = WindowBatch::from_pairs(w, &pairs).unwrap();

        let par = correlate_batch_par(&batch, CorrelationMode::Direct, None);
        let mut scratch = PairScratch::default();
        let seq: Vec<_> = batch
            .pairs()
            .map(|p| correlate_pair(p, CorrelationMode::Direct, None, &mut scratch))
            .collect();
        assert_eq!(par, seq);
    }
}
