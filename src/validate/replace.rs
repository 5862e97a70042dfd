//! Replacement of rejected vectors from their neighbourhood.

use crate::field::{FieldVector, VectorField};
use crate::util::math::median_in_place;
use crate::validate::{ReplaceMethod, ValidationConfig, ValidationMask};

/// Rewrites every rejected cell of `field` from its valid neighbours.
///
/// Neighbours are read from a snapshot taken before any replacement, and a
/// neighbour counts when it is usable and not rejected by `mask`. A cell
/// without such a neighbour keeps its raw value and is flagged unresolved.
/// Returns the number of replaced cells.
pub fn replace_outliers(
    field: &mut VectorField,
    mask: &ValidationMask,
    cfg: &ValidationConfig,
) -> usize {
    let (rows, cols) = (field.rows(), field.cols());
    let snapshot: Vec<FieldVector> = field.as_slice().to_vec();
    let radius = cfg.neighborhood_radius;
    let mut neighbours: Vec<(f32, f32, f32)> = Vec::new();
    let mut replaced = 0;

    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            if !mask.rejected()[i] {
                continue;
            }
            neighbours.clear();
            for nr in r.saturating_sub(radius)..=(r + radius).min(rows - 1) {
                for nc in c.saturating_sub(radius)..=(c + radius).min(cols - 1) {
                    let j = nr * cols + nc;
                    if j == i || mask.rejected()[j] || !snapshot[j].status.is_usable() {
                        continue;
                    }
                    let dist = ((nr.abs_diff(r).pow(2) + nc.abs_diff(c).pow(2)) as f32).sqrt();
                    neighbours.push((snapshot[j].dx, snapshot[j].dy, dist));
                }
            }

            let cell = &mut field.as_mut_slice()[i];
            cell.status.valid = false;
            match interpolate(&mut neighbours, cfg.replace) {
                Some((dx, dy)) => {
                    cell.dx = dx;
                    cell.dy = dy;
                    cell.status.replaced = true;
                    cell.status.unresolved = false;
                    replaced += 1;
                }
                None => {
                    cell.status.replaced = false;
                    cell.status.unresolved = true;
                }
            }
        }
    }
    replaced
}

fn interpolate(neighbours: &mut [(f32, f32, f32)], method: ReplaceMethod) -> Option<(f32, f32)> {
    if neighbours.is_empty() {
        return None;
    }
    match method {
        ReplaceMethod::WeightedMean => {
            let (mut su, mut sv, mut sw) = (0.0f32, 0.0f32, 0.0f32);
            for &(u, v, d) in neighbours.iter() {
                let w = 1.0 / d;
                su += w * u;
                sv += w * v;
                sw += w;
            }
            Some((su / sw, sv / sw))
        }
        ReplaceMethod::Median => {
            let mut us: Vec<f32> = neighbours.iter().map(|n| n.0).collect();
            let mut vs: Vec<f32> = neighbours.iter().map(|n| n.1).collect();
            Some((median_in_place(&mut us)?, median_in_place(&mut vs)?))
        }
    }
}
