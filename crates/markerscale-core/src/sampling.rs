//! Sub-pixel luminosity sampling over an RGBA view.
//!
//! Transition finders work on sharpened samples: an unsharp mask with a
//! 4-neighbour blur counteracts print and compression blur before gradients
//! are taken.

use nalgebra::{Point2, Vector2};

use crate::RgbaImageView;

/// Unsharp-mask strength.
pub const UNSHARP_ALPHA: f64 = 0.5;
/// Offset of the 4-neighbour blur used by the unsharp mask, in pixels.
pub const UNSHARP_RADIUS: f64 = 1.5;
/// Half-steps of the multi-scale gradient, in pixels.
pub const GRADIENT_HALF_STEPS: [f64; 3] = [1.0, 2.0, 3.0];
/// Weights of the multi-scale gradient, one per half-step.
pub const GRADIENT_WEIGHTS: [f64; 3] = [0.25, 0.5, 0.25];

/// Bilinear luminosity at a sub-pixel position (border clamped).
#[inline]
pub fn sample_luminosity(img: &RgbaImageView<'_>, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (xi, yi) = (x0 as i64, y0 as i64);

    let p00 = img.luminosity(xi, yi);
    let p10 = img.luminosity(xi + 1, yi);
    let p01 = img.luminosity(xi, yi + 1);
    let p11 = img.luminosity(xi + 1, yi + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Unsharp-masked luminosity: `o + α·(o − blur)`.
pub fn sample_sharpened(img: &RgbaImageView<'_>, p: Point2<f64>) -> f64 {
    let o = sample_luminosity(img, p.x, p.y);
    let r = UNSHARP_RADIUS;
    let blurred = 0.25
        * (sample_luminosity(img, p.x - r, p.y)
            + sample_luminosity(img, p.x + r, p.y)
            + sample_luminosity(img, p.x, p.y - r)
            + sample_luminosity(img, p.x, p.y + r));
    o + UNSHARP_ALPHA * (o - blurred)
}

/// Central difference of sharpened luminosity along `dir` (unit vector).
pub fn directional_gradient(
    img: &RgbaImageView<'_>,
    p: Point2<f64>,
    dir: Vector2<f64>,
    half_step: f64,
) -> f64 {
    let ahead = sample_sharpened(img, p + dir * half_step);
    let behind = sample_sharpened(img, p - dir * half_step);
    (ahead - behind) / (2.0 * half_step)
}

/// Weighted blend of directional gradients at 1, 2 and 3 px half-steps.
pub fn multiscale_gradient(img: &RgbaImageView<'_>, p: Point2<f64>, dir: Vector2<f64>) -> f64 {
    GRADIENT_HALF_STEPS
        .iter()
        .zip(GRADIENT_WEIGHTS)
        .map(|(&h, w)| w * directional_gradient(img, p, dir, h))
        .sum()
}

/// Vertex offset of the parabola through `(-1, a)`, `(0, b)`, `(1, c)`,
/// clamped to `[-0.5, 0.5]`.
#[inline]
pub fn parabolic_peak_offset(a: f64, b: f64, c: f64) -> f64 {
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
}
