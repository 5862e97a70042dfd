//! Synthetic particle image pairs for integration tests.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Particles per pixel.
pub const DENSITY: f32 = 0.03;

/// Particle image standard deviation in pixels.
pub const SIGMA: f32 = 1.0;

pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub amp: f32,
}

/// Random particles covering the image plus a margin so that shifted
/// particles enter from outside.
pub fn particles(width: usize, height: usize, seed: u64) -> Vec<Particle> {
    let margin = 8.0;
    let mut rng = StdRng::seed_from_u64(seed);
    let area = (width as f32 + 2.0 * margin) * (height as f32 + 2.0 * margin);
    let count = (area * DENSITY) as usize;
    (0..count)
        .map(|_| Particle {
            x: rng.random_range(-margin..width as f32 + margin),
            y: rng.random_range(-margin..height as f32 + margin),
            amp: rng.random_range(100.0..200.0),
        })
        .collect()
}

/// Renders Gaussian particles displaced by `(dx, dy)`.
pub fn render(particles: &[Particle], width: usize, height: usize, dx: f32, dy: f32) -> Vec<f32> {
    let mut image = vec![0.0f32; width * height];
    let reach = (4.0 * SIGMA).ceil() as i64;
    let inv = 1.0 / (2.0 * SIGMA * SIGMA);
    for p in particles {
        let (px, py) = (p.x + dx, p.y + dy);
        let (cx, cy) = (px.round() as i64, py.round() as i64);
        for y in (cy - reach).max(0)..=(cy + reach).min(height as i64 - 1) {
            for x in (cx - reach).max(0)..=(cx + reach).min(width as i64 - 1) {
                let (ex, ey) = (x as f32 - px, y as f32 - py);
                image[y as usize * width + x as usize] += p.amp * (-(ex * ex + ey * ey) * inv).exp();
            }
        }
    }
    image
}

/// Frame pair with a uniform displacement from A to B.
pub fn shifted_pair(size: usize, dx: f32, dy: f32, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let parts = particles(size, size, seed);
    (render(&parts, size, size, 0.0, 0.0), render(&parts, size, size, dx, dy))
}
