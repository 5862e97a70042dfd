//! SNR and neighbourhood tests.

use crate::field::VectorField;
use crate::util::math::{median_abs_deviation, median_in_place};
use crate::validate::{NeighbourTest, ValidationConfig, ValidationMask};

/// Flags the vectors of `field` that fail a test.
///
/// Only vectors flagged valid are judged. Vectors that are already unusable
/// (neither valid nor replaced) are carried into the mask as rejected so the
/// replacement step picks them up. The neighbourhood test selected by
/// `cfg.neighbour_test` compares each component against the in-bounds
/// neighbours within `neighborhood_radius` that are usable and passed the SNR
/// test; a cell with no such neighbour is not judged by it.
pub fn detect_outliers(field: &VectorField, cfg: &ValidationConfig) -> ValidationMask {
    let (rows, cols) = (field.rows(), field.cols());
    let mut mask = ValidationMask::new(rows, cols);
    let cells = field.as_slice();

    for (i, v) in cells.iter().enumerate() {
        if v.status.valid {
            mask.snr_failed[i] = v.snr <= 0.0 || v.snr < cfg.snr_threshold;
        } else if !v.status.replaced {
            mask.rejected[i] = true;
        }
    }

    let radius = cfg.neighborhood_radius;
    let eps = cfg.median_epsilon;
    let capacity = (2 * radius + 1) * (2 * radius + 1);
    let mut us = Vec::with_capacity(capacity);
    let mut vs = Vec::with_capacity(capacity);
    let mut scratch = vec![0.0f32; capacity];

    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            let v = cells[i];
            if !v.status.valid || mask.snr_failed[i] {
                continue;
            }
            us.clear();
            vs.clear();
            for nr in r.saturating_sub(radius)..=(r + radius).min(rows - 1) {
                for nc in c.saturating_sub(radius)..=(c + radius).min(cols - 1) {
                    let j = nr * cols + nc;
                    if j == i || mask.snr_failed[j] || !cells[j].status.is_usable() {
                        continue;
                    }
                    us.push(cells[j].dx);
                    vs.push(cells[j].dy);
                }
            }
            if us.is_empty() {
                continue;
            }
            mask.median_failed[i] = fails_neighbourhood(v.dx, &mut us, &mut scratch, eps, cfg)
                || fails_neighbourhood(v.dy, &mut vs, &mut scratch, eps, cfg);
        }
    }

    for i in 0..rows * cols {
        mask.rejected[i] |= mask.snr_failed[i] || mask.median_failed[i];
    }
    mask
}

fn fails_neighbourhood(
    value: f32,
    neighbours: &mut [f32],
    scratch: &mut [f32],
    eps: f32,
    cfg: &ValidationConfig,
) -> bool {
    let (center, fluctuation) = match cfg.neighbour_test {
        NeighbourTest::Median => {
            let Some(median) = median_in_place(neighbours) else {
                return false;
            };
            let mad = median_abs_deviation(neighbours, median, scratch).unwrap_or(0.0);
            (median, mad)
        }
        NeighbourTest::Mean | NeighbourTest::Rms => {
            if neighbours.is_empty() {
                return false;
            }
            let n = neighbours.len() as f32;
            let mean = neighbours.iter().sum::<f32>() / n;
            let fluctuation = if cfg.neighbour_test == NeighbourTest::Mean {
                neighbours.iter().map(|&x| (x - mean).abs()).sum::<f32>() / n
            } else {
                (neighbours.iter().map(|&x| (x - mean) * (x - mean)).sum::<f32>() / n).sqrt()
            };
            (mean, fluctuation)
        }
    };
    (value - center).abs() / fluctuation.max(eps).max(f32::MIN_POSITIVE) > cfg.median_tolerance
}
