//! Low-level building blocks for custom PIV pipelines.
//!
//! These expose the individual stages behind [`crate::PivProcessor`]: window
//! sampling, single-pair correlation, subpixel fits and the validation steps.
//! Most users should prefer the processor.

pub use crate::grid::{grid_spacing, resample_field, Predictor};
pub use crate::kernel::{correlate_window_pair, surface_side, CorrelationMode};
pub use crate::peak::{centroid_offset, estimate_peak, gaussian_offset, parabolic_offset};
pub use crate::validate::{detect_outliers, replace_outliers};
pub use crate::window::{
    extract_window, extract_window_deformed, extract_window_deformed_masked, extract_windows,
    WindowPair,
};
