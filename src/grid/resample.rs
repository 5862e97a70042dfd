//! Transfer of a validated field onto the next pass's grid.
//!
//! The previous field is sampled at the new window centers (edge-clamped)
//! to give the predicted displacement of every new window. The displacement
//! gradient of the predictor, taken by central differences on the new grid,
//! drives window deformation. The predictor can be smoothed first.

use crate::field::VectorField;
use crate::grid::Grid;
use crate::util::math::{lerp, median_in_place};
use crate::util::{PivError, PivResult};
use crate::window::Deformation;

/// Sampling of the previous field at new window centers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Value of the nearest previous cell.
    Nearest,
    /// Bilinear blend of the four surrounding previous cells.
    #[default]
    Bilinear,
}

/// Per-window predicted displacement for one pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predictor {
    rows: usize,
    cols: usize,
    shifts: Vec<(f32, f32)>,
    gradients: Vec<[f32; 4]>,
}

impl Predictor {
    /// Zero predictor for the first pass.
    pub fn zero(grid: &Grid) -> Self {
        Self {
            rows: grid.rows(),
            cols: grid.cols(),
            shifts: vec![(0.0, 0.0); grid.len()],
            gradients: vec![[0.0; 4]; grid.len()],
        }
    }

    /// Predicted `(dx, dy)` per window, row-major.
    pub fn shifts(&self) -> &[(f32, f32)] {
        &self.shifts
    }

    /// Displacement gradient `[du/dx, du/dy, dv/dx, dv/dy]` per window.
    pub fn gradients(&self) -> &[[f32; 4]] {
        &self.gradients
    }

    /// Deformation for window `index`.
    pub fn deformation(&self, index: usize) -> Deformation {
        let (dx, dy) = self.shifts.get(index).copied().unwrap_or_default();
        let gradient = self.gradients.get(index).copied().unwrap_or_default();
        Deformation { dx, dy, gradient }
    }

    /// Fills the gradients by central differences over the grid spacing
    /// (one-sided on the edges, zero along an axis with a single cell).
    pub fn compute_gradients(&mut self, spacing: usize) {
        let (rows, cols) = (self.rows, self.cols);
        let s = spacing.max(1) as f32;
        let at = |r: usize, c: usize| self.shifts[r * cols + c];
        let mut gradients = vec![[0.0f32; 4]; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                let (mut dudx, mut dvdx, mut dudy, mut dvdy) = (0.0, 0.0, 0.0, 0.0);
                if cols > 1 {
                    let (c0, c1) = (c.saturating_sub(1), (c + 1).min(cols - 1));
                    let span = (c1 - c0) as f32 * s;
                    dudx = (at(r, c1).0 - at(r, c0).0) / span;
                    dvdx = (at(r, c1).1 - at(r, c0).1) / span;
                }
                if rows > 1 {
                    let (r0, r1) = (r.saturating_sub(1), (r + 1).min(rows - 1));
                    let span = (r1 - r0) as f32 * s;
                    dudy = (at(r1, c).0 - at(r0, c).0) / span;
                    dvdy = (at(r1, c).1 - at(r0, c).1) / span;
                }
                gradients[r * cols + c] = [dudx, dudy, dvdx, dvdy];
            }
        }
        self.gradients = gradients;
    }
}

const SMOOTH_MAX_ITERATIONS: usize = 200;
const SMOOTH_TOLERANCE: f32 = 1e-5;

impl Predictor {
    /// Smooths the predicted shifts with a first-order penalty of weight
    /// `strength`.
    ///
    /// Each component solves `(I + strength * L) u = shifts`, where `L` is the
    /// 4-neighbour Laplacian of the grid with free edges, by Jacobi
    /// iteration. Uniform fields and the field mean are preserved.
    pub fn smooth(&mut self, strength: f32) {
        if !(strength.is_finite() && strength > 0.0) || self.shifts.len() < 2 {
            return;
        }
        let (rows, cols) = (self.rows, self.cols);
        let observed = self.shifts.clone();
        let mut current = observed.clone();
        let mut next = observed.clone();

        for _ in 0..SMOOTH_MAX_ITERATIONS {
            let mut delta = 0.0f32;
            for r in 0..rows {
                for c in 0..cols {
                    let (mut su, mut sv, mut n) = (0.0f32, 0.0f32, 0.0f32);
                    let around = [
                        (r.wrapping_sub(1), c),
                        (r + 1, c),
                        (r, c.wrapping_sub(1)),
                        (r, c + 1),
                    ];
                    for (nr, nc) in around {
                        if nr < rows && nc < cols {
                            let (u, v) = current[nr * cols + nc];
                            su += u;
                            sv += v;
                            n += 1.0;
                        }
                    }
                    let i = r * cols + c;
                    let (yu, yv) = observed[i];
                    let denom = 1.0 + strength * n;
                    let updated = ((yu + strength * su) / denom, (yv + strength * sv) / denom);
                    delta = delta
                        .max((updated.0 - current[i].0).abs())
                        .max((updated.1 - current[i].1).abs());
                    next[i] = updated;
                }
            }
            std::mem::swap(&mut current, &mut next);
            if delta < SMOOTH_TOLERANCE {
                break;
            }
        }
        self.shifts = current;
    }
}

/// Displacement components with unusable cells replaced by the median of the
/// usable ones (zero when nothing is usable).
fn usable_components(field: &VectorField) -> (Vec<f32>, Vec<f32>) {
    let mut us: Vec<f32> = Vec::new();
    let mut vs: Vec<f32> = Vec::new();
    for v in field.as_slice().iter().filter(|v| v.status.is_usable()) {
        us.push(v.dx);
        vs.push(v.dy);
    }
    let fill_u = median_in_place(&mut us).unwrap_or(0.0);
    let fill_v = median_in_place(&mut vs).unwrap_or(0.0);
    field
        .as_slice()
        .iter()
        .map(|v| {
            if v.status.is_usable() {
                (v.dx, v.dy)
            } else {
                (fill_u, fill_v)
            }
        })
        .unzip()
}

/// Samples `field`, laid out on `from`, at every window center of `to`.
pub fn resample_field(
    from: &Grid,
    field: &VectorField,
    to: &Grid,
    interpolation: Interpolation,
) -> PivResult<Predictor> {
    if field.rows() != from.rows() || field.cols() != from.cols() {
        return Err(PivError::BufferTooSmall {
            needed: from.len(),
            got: field.len(),
        });
    }
    let (u, v) = usable_components(field);
    let cols = from.cols();
    let sample = |fc: f32, fr: f32| -> (f32, f32) {
        match interpolation {
            Interpolation::Nearest => {
                let i = fr.round() as usize * cols + fc.round() as usize;
                (u[i], v[i])
            }
            Interpolation::Bilinear => {
                let (c0, r0) = (fc.floor() as usize, fr.floor() as usize);
                let c1 = (c0 + 1).min(from.cols() - 1);
                let r1 = (r0 + 1).min(from.rows() - 1);
                let (tx, ty) = (fc - c0 as f32, fr - r0 as f32);
                let blend = |comp: &[f32]| {
                    let top = lerp(comp[r0 * cols + c0], comp[r0 * cols + c1], tx);
                    let bottom = lerp(comp[r1 * cols + c0], comp[r1 * cols + c1], tx);
                    lerp(top, bottom, ty)
                };
                (blend(&u), blend(&v))
            }
        }
    };

    let shifts = to
        .centers()
        .into_iter()
        .map(|(x, y)| {
            let (fc, fr) = from.fractional_cell(x, y);
            sample(fc, fr)
        })
        .collect();
    Ok(Predictor {
        rows: to.rows(),
        cols: to.cols(),
        shifts,
        gradients: vec![[0.0; 4]; to.len()],
    })
}

#[cfg(test)]
mod tests {
    use super::{resample_field, Interpolation, Predictor};
    use crate::field::{VectorField, VectorStatus};
    use crate::grid::Grid;

    fn linear_field(grid: &Grid) -> VectorField {
        let mut field = VectorField::zeros(grid.rows(), grid.cols());
        for r in 0..grid.rows() {
            for c in 0..grid.cols() {
                let (x, y) = grid.center(r, c);
                let v = field.get_mut(r, c).unwrap();
                v.dx = 0.01 * x;
                v.dy = -0.02 * y;
            }
        }
        field
    }

    #[test]
    fn same_grid_is_identity() {
        let grid = Grid::new(128, 128, 32, 0.5).unwrap();
        let field = linear_field(&grid);
        let pred = resample_field(&grid, &field, &grid, Interpolation::Bilinear).unwrap();
        for (i, v) in field.as_slice().iter().enumerate() {
            assert!((pred.shifts()[i].0 - v.dx).abs() < 1e-5);
            assert!((pred.shifts()[i].1 - v.dy).abs() < 1e-5);
        }
    }

    #[test]
    fn bilinear_reproduces_linear_field_inside() {
        let coarse = Grid::new(128, 128, 32, 0.5).unwrap();
        let fine = Grid::new(128, 128, 16, 0.5).unwrap();
        let field = linear_field(&coarse);
        let pred = resample_field(&coarse, &field, &fine, Interpolation::Bilinear).unwrap();
        let (lo, hi) = (coarse.center_x(0), coarse.center_x(coarse.cols() - 1));
        for (i, &(x, y)) in fine.centers().iter().enumerate() {
            if x < lo || x > hi || y < lo || y > hi {
                continue;
            }
            assert!((pred.shifts()[i].0 - 0.01 * x).abs() < 1e-4);
            assert!((pred.shifts()[i].1 + 0.02 * y).abs() < 1e-4);
        }
    }

    #[test]
    fn nearest_picks_closest_cell() {
        let coarse = Grid::new(64, 64, 32, 0.5).unwrap();
        let fine = Grid::new(64, 64, 16, 0.0).unwrap();
        let field = linear_field(&coarse);
        let pred = resample_field(&coarse, &field, &fine, Interpolation::Nearest).unwrap();
        // fine (0, 0) at (7.5, 7.5) clamps onto coarse (0, 0)
        assert_eq!(pred.shifts()[0].0, field.get(0, 0).unwrap().dx);
    }

    #[test]
    fn unusable_cells_fall_back_to_median() {
        let grid = Grid::new(64, 64, 16, 0.0).unwrap();
        let mut field = VectorField::zeros(grid.rows(), grid.cols());
        for v in field.as_mut_slice() {
            v.dx = 1.0;
        }
        let bad = field.get_mut(1, 1).unwrap();
        bad.dx = 100.0;
        bad.status = VectorStatus {
            unresolved: true,
            ..VectorStatus::default()
        };
        let pred = resample_field(&grid, &field, &grid, Interpolation::Nearest).unwrap();
        assert_eq!(pred.shifts()[grid.index(1, 1)].0, 1.0);
    }

    #[test]
    fn smoothing_damps_isolated_spike() {
        let grid = Grid::new(96, 96, 16, 0.0).unwrap();
        let mut pred = Predictor::zero(&grid);
        let n = pred.shifts.len();
        for s in pred.shifts.iter_mut() {
            *s = (1.0, -0.5);
        }
        let uniform = pred.clone();
        pred.smooth(0.5);
        assert_eq!(pred, uniform);

        let spike = grid.index(2, 3);
        pred.shifts[spike] = (5.0, -0.5);
        pred.smooth(0.5);
        let (u, v) = pred.shifts()[spike];
        assert!(u < 3.5 && u > 1.5, "spike {u}");
        assert!((v + 0.5).abs() < 1e-4);
        let total: f32 = pred.shifts().iter().map(|s| s.0).sum();
        assert!((total - (n as f32 + 4.0)).abs() < 1e-2);
    }

    #[test]
    fn gradients_of_linear_field() {
        let grid = Grid::new(128, 128, 32, 0.5).unwrap();
        let field = linear_field(&grid);
        let mut pred = resample_field(&grid, &field, &grid, Interpolation::Bilinear).unwrap();
        pred.compute_gradients(grid.spacing());
        for g in pred.gradients() {
            assert!((g[0] - 0.01).abs() < 1e-5);
            assert!(g[1].abs() < 1e-5);
            assert!(g[2].abs() < 1e-5);
            assert!((g[3] + 0.02).abs() < 1e-5);
        }
        let zero = Predictor::zero(&grid);
        assert_eq!(zero.deformation(3).dx, 0.0);
    }
}
