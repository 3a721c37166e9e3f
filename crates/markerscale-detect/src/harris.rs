//! Harris corner check and sub-pixel refinement of predicted pattern
//! corners.
//!
//! The structure tensor over a Gaussian-weighted window decides whether a
//! corner is present at all (positive Harris response, both eigenvalues
//! significant). The position is then refined by gradient orthogonality:
//! the corner is the point `x` minimizing `Σ w (gᵢ · (x − pᵢ))²`.

use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

use markerscale_core::{sample_luminosity, RgbaImageView};

use crate::params::HarrisParams;

/// Iterations stop once the estimate moves less than this, in pixels.
const CONVERGED_PX: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarrisRefinement {
    pub point: Point2<f64>,
    /// Harris response `det − k·tr²` at the predicted position.
    pub response: f64,
    /// Smaller over larger structure-tensor eigenvalue.
    pub eigen_ratio: f64,
}

struct Tensor {
    m: Matrix2<f64>,
    rhs: Vector2<f64>,
    weight: f64,
}

impl Tensor {
    fn eigenvalues(&self) -> (f64, f64) {
        let (a, b, c) = (self.m[(0, 0)], self.m[(0, 1)], self.m[(1, 1)]);
        let mean = 0.5 * (a + c);
        let half = (0.25 * (a - c) * (a - c) + b * b).sqrt();
        (mean - half, mean + half)
    }
}

fn accumulate(img: &RgbaImageView<'_>, center: Point2<f64>, radius: i64) -> Tensor {
    let sigma = (0.5 * radius as f64).max(1.0);
    let mut m = Matrix2::zeros();
    let mut rhs = Vector2::zeros();
    let mut weight = 0.0;
    for j in -radius..=radius {
        for i in -radius..=radius {
            let p = Point2::new(center.x + i as f64, center.y + j as f64);
            let gx = 0.5 * (sample_luminosity(img, p.x + 1.0, p.y) - sample_luminosity(img, p.x - 1.0, p.y));
            let gy = 0.5 * (sample_luminosity(img, p.x, p.y + 1.0) - sample_luminosity(img, p.x, p.y - 1.0));
            let w = (-((i * i + j * j) as f64) / (2.0 * sigma * sigma)).exp();
            let g = Vector2::new(gx, gy);
            let ggt = g * g.transpose() * w;
            m += ggt;
            rhs += ggt * p.coords;
            weight += w;
        }
    }
    Tensor { m, rhs, weight }
}

/// Harris response, eigenvalue ratio and mean squared gradient at `p`.
pub fn harris_response(
    img: &RgbaImageView<'_>,
    p: Point2<f64>,
    params: &HarrisParams,
) -> (f64, f64, f64) {
    let t = accumulate(img, p, params.window_radius.max(1));
    let (lmin, lmax) = t.eigenvalues();
    let trace = t.m.trace();
    let response = t.m.determinant() - params.k * trace * trace;
    let ratio = if lmax > f64::EPSILON { lmin / lmax } else { 0.0 };
    (response, ratio, trace / t.weight.max(f64::EPSILON))
}

/// Refine a predicted corner; `None` when no corner is present or the
/// refined point drifts farther than `max_shift_px`.
pub fn refine_harris(
    img: &RgbaImageView<'_>,
    predicted: Point2<f64>,
    params: &HarrisParams,
) -> Option<HarrisRefinement> {
    let (response, eigen_ratio, energy) = harris_response(img, predicted, params);
    if response <= 0.0 || eigen_ratio < params.min_eigen_ratio || energy < params.min_gradient_energy {
        return None;
    }
    let radius = params.window_radius.max(1);
    let mut current = predicted;
    for _ in 0..params.iterations.max(1) {
        let t = accumulate(img, current, radius);
        let next = Point2::from(t.m.try_inverse()? * t.rhs);
        if !(next.x.is_finite() && next.y.is_finite()) {
            return None;
        }
        let step = (next - current).norm();
        current = next;
        if (current - predicted).norm() > params.max_shift_px {
            return None;
        }
        if step < CONVERGED_PX {
            break;
        }
    }
    Some(HarrisRefinement {
        point: current,
        response,
        eigen_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerscale_core::RgbaImage;

    /// Area-sampled image of `f` (true = dark) on a 4×4 sub-grid.
    fn render(w: usize, h: usize, f: impl Fn(f64, f64) -> bool) -> RgbaImage {
        let mut img = RgbaImage::filled(w, h, [0, 0, 0, 255]).unwrap();
        for y in 0..h {
            for x in 0..w {
                let mut dark = 0;
                for sy in 0..4 {
                    for sx in 0..4 {
                        let px = x as f64 - 0.5 + (sx as f64 + 0.5) / 4.0;
                        let py = y as f64 - 0.5 + (sy as f64 + 0.5) / 4.0;
                        if f(px, py) {
                            dark += 1;
                        }
                    }
                }
                let v = (230.0 - 210.0 * dark as f64 / 16.0).round() as u8;
                img.put_pixel(x, y, [v, v, v, 255]);
            }
        }
        img
    }

    #[test]
    fn refines_a_checker_junction() {
        let (cx, cy) = (20.3, 19.6);
        let img = render(40, 40, |x, y| (x < cx) == (y < cy));
        let r = refine_harris(&img.view(), Point2::new(21.2, 18.9), &HarrisParams::default())
            .expect("corner");
        assert!((r.point.x - cx).abs() < 0.15, "{r:?}");
        assert!((r.point.y - cy).abs() < 0.15, "{r:?}");
        assert!(r.response > 0.0);
    }

    #[test]
    fn refines_an_l_corner() {
        let (cx, cy) = (18.5, 21.25);
        let img = render(40, 40, |x, y| x >= cx && y >= cy);
        let r = refine_harris(&img.view(), Point2::new(19.0, 20.5), &HarrisParams::default())
            .expect("corner");
        assert!((r.point.x - cx).abs() < 0.2, "{r:?}");
        assert!((r.point.y - cy).abs() < 0.2, "{r:?}");
    }

    #[test]
    fn straight_edges_and_flat_areas_are_rejected() {
        let edge = render(40, 40, |x, _| x < 20.0);
        assert!(refine_harris(&edge.view(), Point2::new(20.0, 20.0), &HarrisParams::default()).is_none());
        let flat = RgbaImage::filled(40, 40, [128, 128, 128, 255]).unwrap();
        assert!(refine_harris(&flat.view(), Point2::new(20.0, 20.0), &HarrisParams::default()).is_none());
    }
}
