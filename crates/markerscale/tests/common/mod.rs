//! Synthetic photos of the printed marker for integration tests.
#![allow(dead_code)]

use markerscale::core::{Homography, MarkerSpec, RgbaImage};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const PAPER: [u8; 3] = [235, 235, 235];
pub const INK: [u8; 3] = [20, 20, 20];
pub const MAGENTA: [u8; 3] = [220, 40, 200];
/// Fiducial dot radius as a side fraction.
pub const DOT_RADIUS: f64 = 0.05;

pub fn spec() -> MarkerSpec {
    MarkerSpec::square(168.0)
}

/// Millimetre → pixel map of a mildly tilted photo, about 4 px/mm.
pub fn photo_homography() -> Homography {
    Homography::from_array([
        [4.0, 0.25, 110.0],
        [-0.15, 3.9, 95.0],
        [0.00025, 0.0002, 1.0],
    ])
}

pub const WIDTH: usize = 880;
pub const HEIGHT: usize = 820;

/// Pixel corners `[TL, TR, BR, BL]` of the marker under `real_to_px`.
pub fn pixel_corners(spec: &MarkerSpec, real_to_px: &Homography) -> [Point2<f64>; 4] {
    spec.real_corners().map(|p| real_to_px.apply(p))
}

/// Printed colour at side fractions `(u, v)`: black band, white band and a
/// 6×6 checkerboard mirrored about both centre lines, with optional magenta
/// dots centred in the black band at each corner.
pub fn marker_rgb(spec: &MarkerSpec, u: f64, v: f64, dots: bool) -> [u8; 3] {
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return PAPER;
    }
    if dots {
        let d = 0.5 * spec.outer_band_frac;
        for (cu, cv) in [(d, d), (1.0 - d, d), (1.0 - d, 1.0 - d), (d, 1.0 - d)] {
            if (u - cu).powi(2) + (v - cv).powi(2) <= DOT_RADIUS * DOT_RADIUS {
                return MAGENTA;
            }
        }
    }
    let e = u.min(v).min(1.0 - u).min(1.0 - v);
    if e < spec.outer_band_frac {
        return INK;
    }
    if e < spec.outer_band_frac + spec.inner_band_frac {
        return PAPER;
    }
    let [p0, p1] = spec.pattern_region;
    if u < p0 || u >= p1 || v < p0 || v >= p1 {
        return INK;
    }
    let n = spec.grid_cells as i64;
    let cell = spec.cell_frac();
    let col = (((u - p0) / cell) as i64).min(n - 1);
    let row = (((v - p0) / cell) as i64).min(n - 1);
    let (r, c) = (row.min(n - 1 - row), col.min(n - 1 - col));
    if (r + c) % 2 == 1 {
        INK
    } else {
        PAPER
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    pub dots: bool,
    /// Gaussian blur sigma in pixels; 0 disables the blur.
    pub blur_sigma: f64,
    /// Uniform noise amplitude in grey levels; 0 disables it.
    pub noise: f64,
    pub seed: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dots: false,
            blur_sigma: 0.9,
            noise: 0.0,
            seed: 7,
        }
    }
}

/// Render the marker seen through `real_to_px`, 3×3 supersampled, then
/// blurred and optionally noised.
pub fn render_marker(
    spec: &MarkerSpec,
    real_to_px: &Homography,
    width: usize,
    height: usize,
    opts: RenderOptions,
) -> RgbaImage {
    let px_to_real = real_to_px.inverse().expect("invertible homography");
    let mut rgb = vec![[0.0f64; 3]; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0; 3];
            for sy in 0..3 {
                for sx in 0..3 {
                    let px = x as f64 + (sx as f64 + 0.5) / 3.0 - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) / 3.0 - 0.5;
                    let c = match px_to_real.try_apply(Point2::new(px, py)) {
                        Some(r) => marker_rgb(spec, r.x / spec.width_mm, r.y / spec.height_mm, opts.dots),
                        None => PAPER,
                    };
                    for k in 0..3 {
                        acc[k] += c[k] as f64 / 9.0;
                    }
                }
            }
            rgb[y * width + x] = acc;
        }
    }
    if opts.blur_sigma > 0.0 {
        rgb = gaussian_blur(&rgb, width, height, opts.blur_sigma);
    }
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut data = Vec::with_capacity(width * height * 4);
    for px in rgb {
        let n = if opts.noise > 0.0 {
            rng.random_range(-opts.noise..=opts.noise)
        } else {
            0.0
        };
        for c in px {
            data.push((c + n).round().clamp(0.0, 255.0) as u8);
        }
        data.push(255);
    }
    RgbaImage::new(width, height, data).expect("consistent buffer")
}

fn gaussian_blur(src: &[[f64; 3]], width: usize, height: usize, sigma: f64) -> Vec<[f64; 3]> {
    let radius = (3.0 * sigma).ceil() as i64;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();
    let kernel: Vec<f64> = kernel.iter().map(|k| k / norm).collect();

    let pass = |input: &[[f64; 3]], horizontal: bool| {
        let mut out = vec![[0.0; 3]; input.len()];
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                let mut acc = [0.0; 3];
                for (k, w) in kernel.iter().enumerate() {
                    let o = k as i64 - radius;
                    let (sx, sy) = if horizontal {
                        ((x + o).clamp(0, width as i64 - 1), y)
                    } else {
                        (x, (y + o).clamp(0, height as i64 - 1))
                    };
                    let p = input[sy as usize * width + sx as usize];
                    for c in 0..3 {
                        acc[c] += w * p[c];
                    }
                }
                out[y as usize * width + x as usize] = acc;
            }
        }
        out
    };
    let tmp = pass(src, true);
    pass(&tmp, false)
}
