//! Interrogation windows and the reusable batch buffer handed to backends.
//!
//! A [`WindowBatch`] stores frame-A and frame-B windows back to back in two
//! contiguous buffers, plus one support mask per pair marking the pixels
//! where both samplers read from inside the image. The controller keeps one
//! batch alive for the whole run and calls [`WindowBatch::reset`] per chunk,
//! so the allocation grows to the largest chunk and is then reused.

mod extract;

pub use extract::{
    extract_window, extract_window_deformed, extract_window_deformed_masked, extract_windows,
};

use crate::util::{PivError, PivResult};

/// Displacement applied to a window before sampling.
///
/// `gradient` holds `[du/dx, du/dy, dv/dx, dv/dy]` of the displacement
/// field at the window center; all zeros means a pure translation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Deformation {
    /// Horizontal displacement in pixels.
    pub dx: f32,
    /// Vertical displacement in pixels.
    pub dy: f32,
    /// Displacement gradient `[du/dx, du/dy, dv/dx, dv/dy]`.
    pub gradient: [f32; 4],
}

impl Deformation {
    /// Pure translation.
    pub fn shift(dx: f32, dy: f32) -> Self {
        Self {
            dx,
            dy,
            gradient: [0.0; 4],
        }
    }
}

/// Borrowed pair of equally sized windows.
#[derive(Clone, Copy, Debug)]
pub struct WindowPair<'a> {
    /// Frame-A window, row-major.
    pub a: &'a [f32],
    /// Frame-B window, row-major.
    pub b: &'a [f32],
    /// Side length in pixels.
    pub size: usize,
    /// Pixels sampled from inside the image in both frames; `None` means all.
    pub support: Option<&'a [bool]>,
}

/// Contiguous buffer of window pairs sharing one window size.
#[derive(Clone, Debug, Default)]
pub struct WindowBatch {
    window_size: usize,
    len: usize,
    a: Vec<f32>,
    b: Vec<f32>,
    support: Vec<bool>,
}

impl WindowBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resizes the batch to `len` windows of `window_size`², zeroing contents,
    /// marking every pixel as supported and keeping the existing allocation
    /// where possible.
    pub fn reset(&mut self, window_size: usize, len: usize) {
        let total = window_size * window_size * len;
        self.window_size = window_size;
        self.len = len;
        self.a.clear();
        self.a.resize(total, 0.0);
        self.b.clear();
        self.b.resize(total, 0.0);
        self.support.clear();
        self.support.resize(total, true);
    }

    /// Builds a batch from explicit window buffers.
    pub fn from_pairs(window_size: usize, pairs: &[(&[f32], &[f32])]) -> PivResult<Self> {
        let area = window_size * window_size;
        let mut batch = Self::new();
        batch.reset(window_size, pairs.len());
        for (i, (a, b)) in pairs.iter().enumerate() {
            if a.len() != area || b.len() != area {
                return Err(PivError::BufferTooSmall {
                    needed: area,
                    got: a.len().min(b.len()),
                });
            }
            batch.a[i * area..(i + 1) * area].copy_from_slice(a);
            batch.b[i * area..(i + 1) * area].copy_from_slice(b);
        }
        Ok(batch)
    }

    /// Side length of every window in the batch.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of window pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the batch holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns pair `index`, if present.
    pub fn pair(&self, index: usize) -> Option<WindowPair<'_>> {
        if index >= self.len {
            return None;
        }
        let area = self.window_size * self.window_size;
        let range = index * area..(index + 1) * area;
        Some(WindowPair {
            a: &self.a[range.clone()],
            b: &self.b[range.clone()],
            size: self.window_size,
            support: Some(&self.support[range]),
        })
    }

    /// Iterates over all pairs in order.
    pub fn pairs(&self) -> impl Iterator<Item = WindowPair<'_>> + '_ {
        (0..self.len).filter_map(move |i| self.pair(i))
    }

    /// Mutable access to both window buffers and the support mask.
    pub(crate) fn buffers_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [bool]) {
        (&mut self.a, &mut self.b, &mut self.support)
    }

    /// Bytes held by the window buffers and masks.
    pub fn bytes(&self) -> usize {
        (self.a.capacity() + self.b.capacity()) * std::mem::size_of::<f32>()
            + self.support.capacity()
    }
}
