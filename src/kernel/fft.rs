//! Transform-domain correlation with `rustfft`.
//!
//! Both windows are zero-padded to `2w`×`2w`, so the circular correlation
//! returned by `IFFT(conj(A)·B)` holds every linear lag in `[-(w-1), w-1]`
//! without wrap-around: lag `k` lives at index `k mod 2w`. The result is
//! cropped to the same `(2w-1)²` layout as the direct path.
//!
//! The 2D transform is separable: rows first, then columns through a
//! transpose. Only the first `w` rows carry data before the row pass.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Forward and inverse plans for one padded size.
pub(crate) struct FftPlans {
    n: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch_len: usize,
}

impl FftPlans {
    /// Plans transforms for windows of `window_size`.
    pub(crate) fn new(window_size: usize) -> Self {
        let n = 2 * window_size;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            n,
            forward,
            inverse,
            scratch_len,
        }
    }
}

/// Plans shared across workers, keyed by window size.
#[derive(Default)]
pub(crate) struct PlanCache {
    plans: Mutex<HashMap<usize, Arc<FftPlans>>>,
}

impl PlanCache {
    /// Returns the cached plans for `window_size`, planning on first use.
    pub(crate) fn get(&self, window_size: usize) -> Arc<FftPlans> {
        let mut guard = match self.plans.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .entry(window_size)
            .or_insert_with(|| Arc::new(FftPlans::new(window_size)))
            .clone()
    }
}

/// Per-worker complex buffers.
#[derive(Default)]
pub(crate) struct FftScratch {
    fa: Vec<Complex<f32>>,
    fb: Vec<Complex<f32>>,
    ta: Vec<Complex<f32>>,
    tb: Vec<Complex<f32>>,
    work: Vec<Complex<f32>>,
}

impl FftScratch {
    fn prepare(&mut self, n: usize, scratch_len: usize) {
        let zero = Complex::new(0.0, 0.0);
        for buf in [&mut self.fa, &mut self.fb, &mut self.ta, &mut self.tb] {
            buf.clear();
            buf.resize(n * n, zero);
        }
        self.work.resize(scratch_len, zero);
    }
}

fn load_padded(src: &[f32], w: usize, n: usize, dst: &mut [Complex<f32>]) {
    for (src_row, dst_row) in src.chunks_exact(w).zip(dst.chunks_exact_mut(n)) {
        for (d, &s) in dst_row.iter_mut().zip(src_row) {
            *d = Complex::new(s, 0.0);
        }
    }
}

fn transpose(src: &[Complex<f32>], dst: &mut [Complex<f32>], n: usize) {
    for y in 0..n {
        for x in 0..n {
            dst[x * n + y] = src[y * n + x];
        }
    }
}

/// Unnormalized correlation of two zero-mean `w`×`w` windows, written in
/// the `(2w-1)²` surface layout.
pub(crate) fn correlate_fft(
    a: &[f32],
    b: &[f32],
    w: usize,
    plans: &FftPlans,
    scratch: &mut FftScratch,
    out: &mut [f32],
) {
    let n = plans.n;
    scratch.prepare(n, plans.scratch_len);
    let FftScratch {
        fa,
        fb,
        ta,
        tb,
        work,
    } = scratch;

    load_padded(a, w, n, fa);
    load_padded(b, w, n, fb);

    // rows below w are zero and stay zero under the row transform
    plans.forward.process_with_scratch(&mut fa[..w * n], work);
    plans.forward.process_with_scratch(&mut fb[..w * n], work);

    transpose(fa, ta, n);
    transpose(fb, tb, n);
    plans.forward.process_with_scratch(ta, work);
    plans.forward.process_with_scratch(tb, work);

    for (x, &y) in ta.iter_mut().zip(tb.iter()) {
        *x = x.conj() * y;
    }

    plans.inverse.process_with_scratch(ta, work);
    transpose(ta, fa, n);
    plans.inverse.process_with_scratch(fa, work);

    let scale = 1.0 / (n * n) as f32;
    let side = 2 * w - 1;
    let wi = w as isize;
    let ni = n as isize;
    for (r, out_row) in out.chunks_exact_mut(side).take(side).enumerate() {
        let lag_y = r as isize - (wi - 1);
        let src_row = lag_y.rem_euclid(ni) as usize;
        for (c, dst) in out_row.iter_mut().enumerate() {
            let lag_x = c as isize - (wi - 1);
            let src_col = lag_x.rem_euclid(ni) as usize;
            *dst = fa[src_row * n + src_col].re * scale;
        }
    }
}
