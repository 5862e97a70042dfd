//! Outlier detection and replacement.
//!
//! Detection runs two tests on every vector still flagged valid: an SNR
//! threshold and a normalized neighbourhood test (median, mean or RMS).
//! Rejected vectors, together with vectors that were already unusable, are
//! then replaced from their valid neighbours. Both steps read a snapshot of
//! the field so the outcome does not depend on traversal order.

mod detect;
mod replace;

pub use detect::detect_outliers;
pub use replace::replace_outliers;

use crate::field::VectorField;
use crate::trace::{trace_event, trace_warn};
use crate::util::{PivError, PivResult};

/// How rejected vectors are rebuilt from their neighbours.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplaceMethod {
    /// Inverse-distance weighted mean of valid neighbours.
    #[default]
    WeightedMean,
    /// Component-wise median of valid neighbours.
    Median,
}

/// Statistic a vector is compared against in its neighbourhood.
///
/// Each test divides the distance to a central value by a fluctuation
/// floored at `median_epsilon`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NeighbourTest {
    /// Median of the neighbours, scaled by their median absolute deviation.
    #[default]
    Median,
    /// Mean of the neighbours, scaled by their mean absolute deviation.
    Mean,
    /// Mean of the neighbours, scaled by their RMS deviation.
    Rms,
}

/// Validation thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidationConfig {
    /// Vectors with a lower signal-to-noise ratio are rejected.
    pub snr_threshold: f32,
    /// Neighbourhood statistic used after the SNR test.
    pub neighbour_test: NeighbourTest,
    /// Normalized residual above which a vector is rejected.
    pub median_tolerance: f32,
    /// Floor on the neighbour fluctuation, in pixels.
    pub median_epsilon: f32,
    /// Neighbourhood half-size in cells.
    pub neighborhood_radius: usize,
    /// Replacement rule.
    pub replace: ReplaceMethod,
    /// Detection and replacement rounds per pass.
    pub iterations: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            snr_threshold: 1.3,
            neighbour_test: NeighbourTest::Median,
            median_tolerance: 2.0,
            median_epsilon: 0.1,
            neighborhood_radius: 1,
            replace: ReplaceMethod::WeightedMean,
            iterations: 1,
        }
    }
}

impl ValidationConfig {
    /// Checks that every threshold is usable.
    pub fn validate(&self) -> PivResult<()> {
        if !self.snr_threshold.is_finite() || self.snr_threshold < 0.0 {
            return Err(PivError::config("snr_threshold must be finite and >= 0"));
        }
        if !self.median_tolerance.is_finite() || self.median_tolerance <= 0.0 {
            return Err(PivError::config("median_tolerance must be finite and > 0"));
        }
        if !self.median_epsilon.is_finite() || self.median_epsilon < 0.0 {
            return Err(PivError::config("median_epsilon must be finite and >= 0"));
        }
        if self.neighborhood_radius == 0 {
            return Err(PivError::config("neighborhood_radius must be >= 1"));
        }
        if self.iterations == 0 {
            return Err(PivError::config("validation iterations must be >= 1"));
        }
        Ok(())
    }
}

/// Cells rejected by one detection round, with the test that fired.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationMask {
    rows: usize,
    cols: usize,
    snr_failed: Vec<bool>,
    median_failed: Vec<bool>,
    rejected: Vec<bool>,
}

impl ValidationMask {
    pub(crate) fn new(rows: usize, cols: usize) -> Self {
        let n = rows * cols;
        Self {
            rows,
            cols,
            snr_failed: vec![false; n],
            median_failed: vec![false; n],
            rejected: vec![false; n],
        }
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of grid columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// True when `(row, col)` must be replaced.
    pub fn is_rejected(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.rejected[row * self.cols + col]
    }

    /// Row-major rejection flags.
    pub fn rejected(&self) -> &[bool] {
        &self.rejected
    }

    /// Row-major flags of the SNR test.
    pub fn snr_failed(&self) -> &[bool] {
        &self.snr_failed
    }

    /// Row-major flags of the normalized median test.
    pub fn median_failed(&self) -> &[bool] {
        &self.median_failed
    }

    /// Number of rejected cells.
    pub fn rejected_count(&self) -> usize {
        self.rejected.iter().filter(|&&r| r).count()
    }
}

/// Counts accumulated over all validation rounds of one pass.
///
/// A cell is counted once, under the reason of the first round that
/// rejected it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    /// Vectors rejected by the SNR test.
    pub snr_rejected: usize,
    /// Vectors rejected by the neighbourhood test only.
    pub median_rejected: usize,
    /// Vectors that entered validation already unusable.
    pub previously_invalid: usize,
    /// Vectors overwritten by interpolation.
    pub replaced: usize,
    /// Cells left without a replacement after the last round.
    pub unresolved: Vec<(usize, usize)>,
}

impl ValidationReport {
    /// Distinct cells rejected over all rounds.
    pub fn invalid(&self) -> usize {
        self.snr_rejected + self.median_rejected + self.previously_invalid
    }
}

/// Runs `cfg.iterations` rounds of detection and replacement on `field`.
///
/// Returns the mask of the last round and the accumulated report.
pub fn validate_field(
    field: &mut VectorField,
    cfg: &ValidationConfig,
) -> PivResult<(ValidationMask, ValidationReport)> {
    cfg.validate()?;
    let mut report = ValidationReport::default();
    let mut mask = ValidationMask::new(field.rows(), field.cols());
    let mut counted = vec![false; field.len()];
    for _ in 0..cfg.iterations {
        mask = detect_outliers(field, cfg);
        for (i, v) in field.as_slice().iter().enumerate() {
            if counted[i] || !mask.rejected[i] {
                continue;
            }
            counted[i] = true;
            if mask.snr_failed[i] {
                report.snr_rejected += 1;
            } else if mask.median_failed[i] {
                report.median_rejected += 1;
            } else if !v.status.valid {
                report.previously_invalid += 1;
            }
        }
        if mask.rejected_count() == 0 {
            break;
        }
        report.replaced += replace_outliers(field, &mask, cfg);
    }
    report.unresolved = field.unresolved();

    trace_event!(
        "validation",
        invalid = report.invalid(),
        replaced = report.replaced,
        unresolved = report.unresolved.len()
    );
    if !report.unresolved.is_empty() {
        trace_warn!("unresolved_vectors", count = report.unresolved.len());
    }
    Ok((mask, report))
}

#[cfg(test)]
mod tests {
    use super::{validate_field, ValidationConfig};
    use crate::field::VectorField;

    fn smooth(rows: usize, cols: usize) -> VectorField {
        let mut field = VectorField::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                let v = field.get_mut(r, c).unwrap();
                v.dx = 2.0 + 0.01 * c as f32;
                v.dy = -1.0 + 0.02 * r as f32;
                v.snr = 5.0;
            }
        }
        field
    }

    #[test]
    fn valid_field_is_untouched() {
        let mut field = smooth(6, 7);
        let before = field.clone();
        let (mask, report) = validate_field(&mut field, &ValidationConfig::default()).unwrap();
        assert_eq!(field, before);
        assert_eq!(mask.rejected_count(), 0);
        assert_eq!(report.invalid(), 0);

        let (_, again) = validate_field(&mut field, &ValidationConfig::default()).unwrap();
        assert_eq!(field, before);
        assert_eq!(again.invalid(), 0);
    }

    #[test]
    fn spike_is_replaced() {
        let mut field = smooth(5, 5);
        let reference = field.get(2, 2).copied().unwrap();
        field.get_mut(2, 2).unwrap().dx = 100.0;
        let (mask, report) = validate_field(&mut field, &ValidationConfig::default()).unwrap();
        assert!(mask.is_rejected(2, 2));
        assert_eq!(report.median_rejected, 1);
        assert_eq!(report.replaced, 1);
        let fixed = field.get(2, 2).unwrap();
        assert!(fixed.status.replaced && !fixed.status.valid);
        assert!((fixed.dx - reference.dx).abs() < 0.05);
    }

    #[test]
    fn repeated_rounds_count_each_cell_once() {
        let mut field = smooth(3, 3);
        for v in field.as_mut_slice() {
            v.snr = 0.0;
        }
        let cfg = ValidationConfig {
            iterations: 3,
            ..ValidationConfig::default()
        };
        let (_, report) = validate_field(&mut field, &cfg).unwrap();
        assert_eq!(report.snr_rejected, 9);
        assert_eq!(report.previously_invalid, 0);
        assert_eq!(report.invalid(), 9);
        assert_eq!(report.unresolved.len(), 9);
    }

    #[test]
    fn rejects_bad_config() {
        let cfg = ValidationConfig {
            iterations: 0,
            ..ValidationConfig::default()
        };
        let mut field = smooth(2, 2);
        assert!(validate_field(&mut field, &cfg).is_err());
    }
}
