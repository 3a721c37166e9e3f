//! Synthetic marker images for unit tests.

use markerscale_core::{MarkerSpec, Quad, RgbaImage};
use nalgebra::Point2;

pub(crate) const PAPER: [u8; 3] = [235, 235, 235];
pub(crate) const INK: [u8; 3] = [20, 20, 20];
pub(crate) const MAGENTA: [u8; 3] = [220, 40, 200];
/// Dot radius as a side fraction.
pub(crate) const DOT_RADIUS: f64 = 0.05;

/// Printed colour at marker-plane fractions `(u, v)`.
///
/// The pattern is a checkerboard mirrored about both centre lines, so that
/// the cells touching the light band along every sample row are dark.
pub(crate) fn marker_rgb(spec: &MarkerSpec, u: f64, v: f64, dots: bool) -> [u8; 3] {
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

/// Axis-aligned marker whose top-left corner sits at `origin` (pixel
/// centres at integer coordinates), 3×3 supersampled.
pub(crate) fn render_axis_aligned(
    width: usize,
    height: usize,
    origin: (f64, f64),
    side_px: f64,
    spec: &MarkerSpec,
    dots: bool,
) -> RgbaImage {
    let mut img = RgbaImage::filled(width, height, [PAPER[0], PAPER[1], PAPER[2], 255]).unwrap();
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0u32; 3];
            for sy in 0..3 {
                for sx in 0..3 {
                    let px = x as f64 + (sx as f64 + 0.5) / 3.0 - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) / 3.0 - 0.5;
                    let u = (px - origin.0) / side_px;
                    let v = (py - origin.1) / side_px;
                    let c = marker_rgb(spec, u, v, dots);
                    for k in 0..3 {
                        acc[k] += c[k] as u32;
                    }
                }
            }
            let c = acc.map(|a| ((a + 4) / 9) as u8);
            img.put_pixel(x, y, [c[0], c[1], c[2], 255]);
        }
    }
    img
}

pub(crate) fn square_quad(x0: f64, y0: f64, side: f64) -> Quad {
    Quad::from_ordered([
        Point2::new(x0, y0),
        Point2::new(x0 + side, y0),
        Point2::new(x0 + side, y0 + side),
        Point2::new(x0, y0 + side),
    ])
}
