//! Final field assembly with physical coordinates.

use crate::field::VectorField;
use crate::grid::Grid;
use crate::util::{PivError, PivResult};

/// Conversion from pixels and frames to physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldMetadata {
    /// Physical length of one pixel.
    pub pixel_scale: f32,
    /// Physical position of pixel `(0, 0)`.
    pub origin: (f32, f32),
    /// Time between frame A and frame B.
    pub dt: f32,
}

impl Default for FieldMetadata {
    fn default() -> Self {
        Self {
            pixel_scale: 1.0,
            origin: (0.0, 0.0),
            dt: 1.0,
        }
    }
}

impl FieldMetadata {
    /// Checks that the scale and time step are positive.
    pub fn validate(&self) -> PivResult<()> {
        if !self.pixel_scale.is_finite() || self.pixel_scale <= 0.0 {
            return Err(PivError::config("pixel_scale must be finite and > 0"));
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(PivError::config("dt must be finite and > 0"));
        }
        if !self.origin.0.is_finite() || !self.origin.1.is_finite() {
            return Err(PivError::config("origin must be finite"));
        }
        Ok(())
    }
}

/// What one pass measured.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassSummary {
    /// Zero-based pass index.
    pub pass: usize,
    /// Window size of the pass.
    pub window_size: usize,
    /// Overlap fraction of the pass.
    pub overlap: f32,
    /// Grid spacing in pixels.
    pub spacing: usize,
    /// Grid rows.
    pub rows: usize,
    /// Grid columns.
    pub cols: usize,
    /// RMS correction over the predictor, divided by 0.5 px.
    pub residual: f32,
    /// Vectors rejected by validation.
    pub invalid: usize,
    /// Vectors replaced by interpolation.
    pub replaced: usize,
    /// Vectors left unresolved.
    pub unresolved: usize,
    /// Window pairs with zero variance.
    pub degenerate: usize,
}

/// Result of a PIV run.
#[derive(Clone, Debug, PartialEq)]
pub struct PivOutput {
    /// Grid of the last pass.
    pub grid: Grid,
    /// Validated displacement field in pixels.
    pub field: VectorField,
    /// Unit conversion applied to coordinates and velocities.
    pub metadata: FieldMetadata,
    /// Physical x of each grid column.
    pub x: Vec<f32>,
    /// Physical y of each grid row.
    pub y: Vec<f32>,
    /// One summary per executed pass.
    pub passes: Vec<PassSummary>,
    /// Cells without a usable vector.
    pub unresolved: Vec<(usize, usize)>,
}

impl PivOutput {
    /// Window center of `(row, col)` in pixels.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f32, f32) {
        self.grid.center(row, col)
    }

    /// Physical coordinates of `(row, col)`.
    pub fn coordinates(&self, row: usize, col: usize) -> Option<(f32, f32)> {
        Some((*self.x.get(col)?, *self.y.get(row)?))
    }

    /// Physical velocity of `(row, col)`.
    pub fn velocity(&self, row: usize, col: usize) -> Option<(f32, f32)> {
        let v = self.field.get(row, col)?;
        let k = self.metadata.pixel_scale / self.metadata.dt;
        Some((v.dx * k, v.dy * k))
    }
}

/// Pairs grid centers with vectors and attaches physical units.
pub fn assemble(
    grid: Grid,
    field: VectorField,
    metadata: FieldMetadata,
    passes: Vec<PassSummary>,
) -> PivResult<PivOutput> {
    metadata.validate()?;
    if field.rows() != grid.rows() || field.cols() != grid.cols() {
        return Err(PivError::BufferTooSmall {
            needed: grid.len(),
            got: field.len(),
        });
    }
    let scale = metadata.pixel_scale;
    let x = (0..grid.cols())
        .map(|c| metadata.origin.0 + grid.center_x(c) * scale)
        .collect();
    let y = (0..grid.rows())
        .map(|r| metadata.origin.1 + grid.center_y(r) * scale)
        .collect();
    let unresolved = field.unresolved();
    Ok(PivOutput {
        grid,
        field,
        metadata,
        x,
        y,
        passes,
        unresolved,
    })
}
