//! Interrogation grids.
//!
//! A grid tiles the image with windows of one size whose top-left corners are
//! `spacing` pixels apart. Window centers are geometric centers in pixel-index
//! coordinates, so a window of size `w` at column `c` covers pixels
//! `c * spacing .. c * spacing + w` and is centered at
//! `c * spacing + (w - 1) / 2`.

mod resample;

pub use resample::{resample_field, Interpolation, Predictor};

use crate::util::{PivError, PivResult};

/// Smallest supported interrogation window.
pub const MIN_WINDOW_SIZE: usize = 8;

/// Window layout for one pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    window_size: usize,
    overlap: f32,
    spacing: usize,
    rows: usize,
    cols: usize,
    image_width: usize,
    image_height: usize,
}

/// Spacing between neighbouring windows for a size and overlap fraction.
pub fn grid_spacing(window_size: usize, overlap: f32) -> usize {
    let overlapped = (window_size as f32 * overlap).floor() as usize;
    window_size.saturating_sub(overlapped).max(1)
}

impl Grid {
    /// Lays out windows of `window_size` with the given overlap fraction.
    pub fn new(
        image_width: usize,
        image_height: usize,
        window_size: usize,
        overlap: f32,
    ) -> PivResult<Self> {
        if image_width == 0 || image_height == 0 {
            return Err(PivError::InvalidDimensions {
                width: image_width,
                height: image_height,
            });
        }
        if window_size < MIN_WINDOW_SIZE {
            return Err(PivError::config(format!(
                "window size {window_size} is below the minimum of {MIN_WINDOW_SIZE}"
            )));
        }
        if !overlap.is_finite() || !(0.0..1.0).contains(&overlap) {
            return Err(PivError::config(format!(
                "overlap {overlap} must lie in [0, 1)"
            )));
        }
        if window_size > image_width || window_size > image_height {
            return Err(PivError::WindowTooLarge {
                window_size,
                img_width: image_width,
                img_height: image_height,
            });
        }

        let spacing = grid_spacing(window_size, overlap);
        Ok(Self {
            window_size,
            overlap,
            spacing,
            rows: (image_height - window_size) / spacing + 1,
            cols: (image_width - window_size) / spacing + 1,
            image_width,
            image_height,
        })
    }

    /// Window side length.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Overlap fraction the grid was built with.
    pub fn overlap(&self) -> f32 {
        self.overlap
    }

    /// Pixels between neighbouring window centers.
    pub fn spacing(&self) -> usize {
        self.spacing
    }

    /// Number of window rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of window columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of windows.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns true when the grid holds no windows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image size the grid was built for.
    pub fn image_size(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    /// Row-major index of `(row, col)`.
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Center of the first window along each axis.
    pub fn origin(&self) -> f32 {
        (self.window_size as f32 - 1.0) * 0.5
    }

    /// Center x of column `col`.
    pub fn center_x(&self, col: usize) -> f32 {
        (col * self.spacing) as f32 + self.origin()
    }

    /// Center y of row `row`.
    pub fn center_y(&self, row: usize) -> f32 {
        (row * self.spacing) as f32 + self.origin()
    }

    /// Center of window `(row, col)` as `(x, y)`.
    pub fn center(&self, row: usize, col: usize) -> (f32, f32) {
        (self.center_x(col), self.center_y(row))
    }

    /// Center of the window at row-major `index`.
    pub fn center_of(&self, index: usize) -> (f32, f32) {
        let cols = self.cols.max(1);
        self.center(index / cols, index % cols)
    }

    /// All window centers in row-major order.
    pub fn centers(&self) -> Vec<(f32, f32)> {
        (0..self.len()).map(|i| self.center_of(i)).collect()
    }

    /// Fractional column and row of an image point, clamped to the grid.
    pub(crate) fn fractional_cell(&self, x: f32, y: f32) -> (f32, f32) {
        let s = self.spacing as f32;
        let fc = ((x - self.origin()) / s).clamp(0.0, (self.cols - 1) as f32);
        let fr = ((y - self.origin()) / s).clamp(0.0, (self.rows - 1) as f32);
        (fc, fr)
    }
}
