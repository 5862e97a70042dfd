//! pivcorr is a CPU-first multi-pass PIV engine built on normalized
//! cross-correlation.
//!
//! Two frames of a particle-seeded flow are tiled into interrogation windows,
//! each window pair is correlated, and the correlation peak gives the local
//! displacement. Later passes shift and deform the windows by the validated
//! result of the previous pass and refine on smaller windows. Correlation
//! runs in batches behind [`CorrelationBackend`], with optional parallelism via
//! the `rayon` feature and a SIMD direct kernel via the `simd` feature.
//!
//! ```no_run
//! use pivcorr::{ImageView, PassConfig, PivConfig, PivProcessor};
//!
//! # fn frames() -> (Vec<f32>, Vec<f32>) { (vec![0.0; 256 * 256], vec![0.0; 256 * 256]) }
//! let (a, b) = frames();
//! let a = ImageView::from_slice(&a, 256, 256)?;
//! let b = ImageView::from_slice(&b, 256, 256)?;
//! let config = PivConfig {
//!     passes: vec![PassConfig::new(64, 0.5), PassConfig::new(32, 0.75)],
//!     ..PivConfig::default()
//! };
//! let output = PivProcessor::new(config).process(a, b)?;
//! println!("{} vectors", output.field.len());
//! # Ok::<(), pivcorr::PivError>(())
//! ```

pub mod field;
pub mod grid;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod peak;
pub mod piv;
mod trace;
pub mod util;
pub mod validate;
pub mod window;

pub use field::{
    assemble, FieldMetadata, FieldVector, PassSummary, PivOutput, VectorField, VectorStatus,
};
pub use grid::{Grid, Interpolation};
pub use image::{ImageView, OwnedImage};
pub use kernel::{CorrelationBackend, CorrelationMode, CorrelationSurface, CpuBackend};
pub use peak::{PeakConfig, PeakEstimate, PeakFit, SnrMethod};
pub use piv::{CancelToken, PassConfig, PivConfig, PivProcessor, ShiftScheme};
pub use util::{PivError, PivResult};
pub use validate::{
    validate_field, NeighbourTest, ReplaceMethod, ValidationConfig, ValidationMask,
    ValidationReport,
};
pub use window::{Deformation, WindowBatch};

#[cfg(feature = "image-io")]
pub use image::io::load_gray_image;
