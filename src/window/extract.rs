//! Interrogation window sampling with zero-filled borders.

use crate::image::ImageView;
use crate::util::{PivError, PivResult};
use crate::window::Deformation;

/// Offset of pixel `i` from the geometric window center.
#[inline]
fn center_offset(i: usize, size: usize) -> f32 {
    i as f32 - (size as f32 - 1.0) * 0.5
}

fn check_size(image: ImageView<'_, f32>, size: usize) -> PivResult<()> {
    if size == 0 || size > image.width() || size > image.height() {
        return Err(PivError::WindowTooLarge {
            window_size: size,
            img_width: image.width(),
            img_height: image.height(),
        });
    }
    Ok(())
}

fn check_window(image: ImageView<'_, f32>, size: usize, out: &[f32]) -> PivResult<()> {
    check_size(image, size)?;
    let needed = size * size;
    if out.len() < needed {
        return Err(PivError::BufferTooSmall {
            needed,
            got: out.len(),
        });
    }
    Ok(())
}

/// Bilinear sample at `(x, y)`; taps outside the image read as zero.
#[inline]
pub(crate) fn sample_bilinear_zero(image: ImageView<'_, f32>, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let x0f = x.floor();
    let y0f = y.floor();
    let fx = x - x0f;
    let fy = y - y0f;
    let x0 = x0f as i64;
    let y0 = y0f as i64;
    let w = image.width() as i64;
    let h = image.height() as i64;

    let tap = |xi: i64, yi: i64| -> f32 {
        if xi < 0 || yi < 0 || xi >= w || yi >= h {
            0.0
        } else {
            image.at(xi as usize, yi as usize)
        }
    };

    let a = tap(x0, y0);
    let b = tap(x0 + 1, y0);
    let c = tap(x0, y0 + 1);
    let d = tap(x0 + 1, y0 + 1);
    let top = a + (b - a) * fx;
    let bottom = c + (d - c) * fx;
    top + (bottom - top) * fy
}

/// Copies the `size`×`size` window whose geometric center is nearest to
/// `center` into `out` (row-major). Pixels outside the image are zero.
pub fn extract_window(
    image: ImageView<'_, f32>,
    center: (f32, f32),
    size: usize,
    out: &mut [f32],
) -> PivResult<()> {
    check_window(image, size, out)?;
    let half = (size as f32 - 1.0) * 0.5;
    let x0 = (center.0 - half).round() as i64;
    let y0 = (center.1 - half).round() as i64;
    let w = image.width() as i64;
    let h = image.height() as i64;

    for (j, out_row) in out.chunks_exact_mut(size).take(size).enumerate() {
        let y = y0 + j as i64;
        if y < 0 || y >= h {
            out_row.fill(0.0);
            continue;
        }
        let row = image.row(y as usize).ok_or(PivError::BufferTooSmall {
            needed: (y as usize + 1) * image.stride(),
            got: image.as_slice().len(),
        })?;
        let xs = x0.max(0);
        let xe = (x0 + size as i64).min(w);
        out_row.fill(0.0);
        if xs < xe {
            let dst = (xs - x0) as usize;
            let len = (xe - xs) as usize;
            out_row[dst..dst + len].copy_from_slice(&row[xs as usize..xe as usize]);
        }
    }
    Ok(())
}

/// Samples a window centered at `center`, displaced by `factor` times the
/// deformation.
///
/// The pixel at offset `r` from the window center is read from
/// `center + r + factor * (shift + G r)` with bilinear interpolation, `G`
/// being the displacement gradient. Integer-aligned, undeformed requests take
/// the copy path of [`extract_window`].
pub fn extract_window_deformed(
    image: ImageView<'_, f32>,
    center: (f32, f32),
    deformation: &Deformation,
    factor: f32,
    size: usize,
    out: &mut [f32],
) -> PivResult<()> {
    check_window(image, size, out)?;

    let sx = factor * deformation.dx;
    let sy = factor * deformation.dy;
    let [gxx, gxy, gyx, gyy] = deformation.gradient.map(|g| g * factor);
    let half = (size as f32 - 1.0) * 0.5;
    let aligned = |c: f32| (c - half).fract() == 0.0;
    if gxx == 0.0
        && gxy == 0.0
        && gyx == 0.0
        && gyy == 0.0
        && aligned(center.0 + sx)
        && aligned(center.1 + sy)
    {
        return extract_window(image, (center.0 + sx, center.1 + sy), size, out);
    }

    for (j, out_row) in out.chunks_exact_mut(size).take(size).enumerate() {
        let ry = center_offset(j, size);
        for (i, dst) in out_row.iter_mut().enumerate() {
            let rx = center_offset(i, size);
            let x = center.0 + rx + sx + gxx * rx + gxy * ry;
            let y = center.1 + ry + sy + gyx * rx + gyy * ry;
            *dst = sample_bilinear_zero(image, x, y);
        }
    }
    Ok(())
}

/// Tolerance for a sample point sitting on the last row or column.
const SUPPORT_EPS: f32 = 1e-4;

/// [`extract_window_deformed`] that also clears `support` wherever the sample
/// point falls outside the image.
///
/// Calling it for both frames of a pair on the same `support` slice leaves
/// the shared support: pixels that read real data in both windows. Entries
/// already cleared stay cleared.
pub fn extract_window_deformed_masked(
    image: ImageView<'_, f32>,
    center: (f32, f32),
    deformation: &Deformation,
    factor: f32,
    size: usize,
    out: &mut [f32],
    support: &mut [bool],
) -> PivResult<()> {
    extract_window_deformed(image, center, deformation, factor, size, out)?;
    let needed = size * size;
    if support.len() < needed {
        return Err(PivError::BufferTooSmall {
            needed,
            got: support.len(),
        });
    }

    let sx = factor * deformation.dx;
    let sy = factor * deformation.dy;
    let [gxx, gxy, gyx, gyy] = deformation.gradient.map(|g| g * factor);
    let max_x = image.width() as f32 - 1.0 + SUPPORT_EPS;
    let max_y = image.height() as f32 - 1.0 + SUPPORT_EPS;
    let inside = |v: f32, max: f32| v.is_finite() && v >= -SUPPORT_EPS && v <= max;

    for (j, row) in support.chunks_exact_mut(size).take(size).enumerate() {
        let ry = center_offset(j, size);
        for (i, keep) in row.iter_mut().enumerate() {
            let rx = center_offset(i, size);
            let x = center.0 + rx + sx + gxx * rx + gxy * ry;
            let y = center.1 + ry + sy + gyx * rx + gyy * ry;
            *keep &= inside(x, max_x) && inside(y, max_y);
        }
    }
    Ok(())
}

/// Extracts one window per center into a contiguous buffer.
pub fn extract_windows(
    image: ImageView<'_, f32>,
    centers: &[(f32, f32)],
    size: usize,
) -> PivResult<Vec<f32>> {
    check_size(image, size)?;
    let stride = size * size;
    let mut out = vec![0.0f32; centers.len() * stride];
    for (&center, dst) in centers.iter().zip(out.chunks_exact_mut(stride)) {
        extract_window(image, center, size, dst)?;
    }
    Ok(out)
}
