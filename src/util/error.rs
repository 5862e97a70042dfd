//! Error types for pivcorr.

use thiserror::Error;

/// Result alias for pivcorr operations.
pub type PivResult<T> = std::result::Result<T, PivError>;

/// Errors that can occur when running the PIV pipeline.
///
/// Structural problems (configuration, shapes) are reported before any
/// correlation work starts. Per-window numerical degeneracies are never
/// errors; they surface as a zero signal-to-noise ratio instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PivError {
    /// The configuration is inconsistent (window schedule, thresholds, ...).
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// A buffer is shorter than the view or window it backs.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Frame A and frame B do not share a shape.
    #[error("frame shapes differ: {a_width}x{a_height} vs {b_width}x{b_height}")]
    ShapeMismatch {
        a_width: usize,
        a_height: usize,
        b_width: usize,
        b_height: usize,
    },
    /// The interrogation window does not fit inside the image.
    #[error("window of {window_size} px does not fit a {img_width}x{img_height} image")]
    WindowTooLarge {
        window_size: usize,
        img_width: usize,
        img_height: usize,
    },
    /// The correlation backend cannot hold the requested batch.
    #[error("batch of {requested} windows exceeds backend capacity of {capacity}")]
    AcceleratorResource { requested: usize, capacity: usize },
    /// The run was cancelled at a pass boundary.
    #[error("run cancelled before pass {pass}")]
    Cancelled { pass: usize },
    /// Image decoding failed.
    #[error("image io: {reason}")]
    ImageIo { reason: String },
}

impl PivError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        PivError::InvalidConfig {
            reason: reason.into(),
        }
    }
}
