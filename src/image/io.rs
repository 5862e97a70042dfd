//! Frame loading via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::OwnedImage;
use crate::util::{PivError, PivResult};
use std::path::Path;

/// Converts an 8-bit grayscale buffer into an `f32` frame.
pub fn owned_from_gray_image(img: &image::GrayImage) -> PivResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let data = img.as_raw().iter().map(|&v| f32::from(v)).collect();
    OwnedImage::new(data, width, height)
}

/// Converts a 16-bit grayscale buffer into an `f32` frame.
///
/// Camera frames are often stored with 12 or 16 bit depth; values are kept
/// in their native range.
pub fn owned_from_gray16_image(
    img: &image::ImageBuffer<image::Luma<u16>, Vec<u16>>,
) -> PivResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let data = img.as_raw().iter().map(|&v| f32::from(v)).collect();
    OwnedImage::new(data, width, height)
}

/// Loads a frame from disk, converting to grayscale.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> PivResult<OwnedImage> {
    let img = image::open(path).map_err(|err| PivError::ImageIo {
        reason: err.to_string(),
    })?;
    match img {
        image::DynamicImage::ImageLuma16(ref gray16) => owned_from_gray16_image(gray16),
        other => owned_from_gray_image(&other.to_luma8()),
    }
}
