//! Frame views and owned frame buffers.
//!
//! Both frames of a pair are read through [`ImageView`], a borrowed row-major
//! buffer whose stride may exceed the width when rows are padded (for example
//! a frame cropped out of a larger camera buffer). Pixels outside the frame
//! are never read through the view; window sampling handles the border.

use crate::util::{PivError, PivResult};

#[cfg(feature = "image-io")]
pub mod io;

/// Borrowed intensity frame with an explicit row stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Wraps a tightly packed frame.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> PivResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Wraps a frame whose rows start `stride` elements apart.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> PivResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(PivError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Elements between consecutive row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Backing buffer, padding included.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Pixels of row `y`, without padding.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// True when both frames have the same width and height.
    pub fn same_shape<U>(&self, other: &ImageView<'_, U>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl ImageView<'_, f32> {
    /// Reads the pixel at `(x, y)`; the caller guarantees bounds.
    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.stride + x]
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> PivResult<usize> {
    if width == 0 || height == 0 {
        return Err(PivError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(PivError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(PivError::InvalidDimensions { width, height })
}

/// Owned contiguous intensity frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedImage {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    /// Creates a frame from a contiguous row-major buffer.
    pub fn new(data: Vec<f32>, width: usize, height: usize) -> PivResult<Self> {
        if width == 0 || height == 0 {
            return Err(PivError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .ok_or(PivError::InvalidDimensions { width, height })?;
        if data.len() != needed {
            return Err(PivError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Converts an 8-bit grayscale view to an `f32` frame.
    pub fn from_u8_view(view: ImageView<'_, u8>) -> PivResult<Self> {
        let mut data = Vec::with_capacity(view.width() * view.height());
        for y in 0..view.height() {
            let row = view.row(y).ok_or(PivError::BufferTooSmall {
                needed: (y + 1) * view.stride(),
                got: view.as_slice().len(),
            })?;
            data.extend(row.iter().map(|&v| f32::from(v)));
        }
        Self::new(data, view.width(), view.height())
    }

    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major pixels.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Borrows the frame for processing.
    pub fn view(&self) -> ImageView<'_, f32> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}
