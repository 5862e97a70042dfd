//! Displacement fields and output assembly.
//!
//! A [`VectorField`] is the only state carried from one pass to the next.
//! Each pass writes a fresh field; the previous one is read-only while the
//! new one is built.

mod assemble;

pub use assemble::{assemble, FieldMetadata, PassSummary, PivOutput};

use crate::util::{PivError, PivResult};

/// Quality flags of one vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VectorStatus {
    /// Passed every validation test.
    pub valid: bool,
    /// Rejected and overwritten by interpolation from neighbours.
    pub replaced: bool,
    /// Rejected with no valid neighbour to interpolate from.
    pub unresolved: bool,
    /// The correlation peak sat on the surface border.
    pub low_confidence: bool,
}

impl VectorStatus {
    /// Status of a freshly measured vector.
    pub fn measured(low_confidence: bool) -> Self {
        Self {
            valid: true,
            replaced: false,
            unresolved: false,
            low_confidence,
        }
    }

    /// True when the value can seed a predictor or an interpolation.
    pub fn is_usable(&self) -> bool {
        self.valid || self.replaced
    }
}

/// Displacement at one grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FieldVector {
    /// Horizontal displacement in pixels.
    pub dx: f32,
    /// Vertical displacement in pixels.
    pub dy: f32,
    /// Signal-to-noise ratio of the correlation peak.
    pub snr: f32,
    /// Validation state.
    pub status: VectorStatus,
}

/// Row-major grid of vectors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorField {
    rows: usize,
    cols: usize,
    vectors: Vec<FieldVector>,
}

impl VectorField {
    /// Field of zero, valid vectors.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        let zero = FieldVector {
            status: VectorStatus::measured(false),
            ..FieldVector::default()
        };
        Self {
            rows,
            cols,
            vectors: vec![zero; rows * cols],
        }
    }

    /// Wraps row-major vectors; the length must be `rows * cols`.
    pub fn from_vectors(rows: usize, cols: usize, vectors: Vec<FieldVector>) -> PivResult<Self> {
        let needed = rows * cols;
        if vectors.len() != needed {
            return Err(PivError::BufferTooSmall {
                needed,
                got: vectors.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            vectors,
        })
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of grid columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true for an empty field.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<&FieldVector> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.vectors.get(row * self.cols + col)
    }

    /// Mutable vector at `(row, col)`.
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut FieldVector> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.vectors.get_mut(row * self.cols + col)
    }

    /// Row-major vectors.
    pub fn as_slice(&self) -> &[FieldVector] {
        &self.vectors
    }

    /// Mutable row-major vectors.
    pub fn as_mut_slice(&mut self) -> &mut [FieldVector] {
        &mut self.vectors
    }

    /// Iterates over `(row, col, vector)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &FieldVector)> + '_ {
        let cols = self.cols.max(1);
        self.vectors
            .iter()
            .enumerate()
            .map(move |(i, v)| (i / cols, i % cols, v))
    }

    /// Number of cells flagged valid.
    pub fn valid_count(&self) -> usize {
        self.vectors.iter().filter(|v| v.status.valid).count()
    }

    /// Cells that could not be measured or replaced.
    pub fn unresolved(&self) -> Vec<(usize, usize)> {
        self.iter()
            .filter(|(_, _, v)| v.status.unresolved)
            .map(|(r, c, _)| (r, c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldVector, VectorField, VectorStatus};

    #[test]
    fn indexing_is_row_major() {
        let mut field = VectorField::zeros(2, 3);
        field.get_mut(1, 2).unwrap().dx = 4.0;
        assert_eq!(field.as_slice()[5].dx, 4.0);
        assert!(field.get(2, 0).is_none());
        assert_eq!(field.valid_count(), 6);
    }

    #[test]
    fn from_vectors_checks_length() {
        assert!(VectorField::from_vectors(2, 2, vec![FieldVector::default(); 3]).is_err());
    }

    #[test]
    fn unresolved_cells_are_listed() {
        let mut field = VectorField::zeros(2, 2);
        field.get_mut(0, 1).unwrap().status = VectorStatus {
            valid: false,
            unresolved: true,
            ..VectorStatus::default()
        };
        assert_eq!(field.unresolved(), vec![(0, 1)]);
    }
}
