//! Sobel edges, Hough lines and quad assembly.
//!
//! - Sobel magnitude over luminosity with border clamping.
//! - A `(theta, rho)` accumulator fed by strided edge pixels; peaks are
//!   3×3 local maxima above a fraction of the strongest cell, with
//!   near-duplicate lines suppressed.
//! - Lines are split into horizontal-ish and vertical-ish sets; every pair of
//!   each spans a candidate quad, filtered by bounds, size and aspect and
//!   scored on shape (aspect against the marker's expected aspect), line
//!   support and size.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use markerscale_core::{BoundingBox, HoughLine, Quad, RgbaImageView};
use nalgebra::Point2;

use crate::params::EdgeThresholds;

#[cfg(feature = "tracing")]
use tracing::instrument;

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Per-pixel Sobel response.
#[derive(Clone, Debug)]
pub struct Gradients {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<f32>,
    pub gy: Vec<f32>,
    pub mag: Vec<f32>,
}

impl Gradients {
    pub fn max_magnitude(&self) -> f32 {
        self.mag.iter().copied().fold(0.0, f32::max)
    }
}

/// Sobel gradients of the luminosity.
pub fn sobel(img: &RgbaImageView<'_>) -> Gradients {
    let (w, h) = (img.width(), img.height());
    let lum: Vec<f32> = img
        .data()
        .chunks_exact(4)
        .map(|px| (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0)
        .collect();
    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];
    let mut mag = vec![0.0f32; w * h];
    for y in 0..h {
        let rows = [y.saturating_sub(1), y, (y + 1).min(h - 1)];
        for x in 0..w {
            let cols = [x.saturating_sub(1), x, (x + 1).min(w - 1)];
            let (mut sx, mut sy) = (0.0f32, 0.0f32);
            for (ky, &yy) in rows.iter().enumerate() {
                for (kx, &xx) in cols.iter().enumerate() {
                    let v = lum[yy * w + xx];
                    sx += v * SOBEL_X[ky][kx];
                    sy += v * SOBEL_Y[ky][kx];
                }
            }
            let i = y * w + x;
            gx[i] = sx;
            gy[i] = sy;
            mag[i] = (sx * sx + sy * sy).sqrt();
        }
    }
    Gradients {
        width: w,
        height: h,
        gx,
        gy,
        mag,
    }
}

struct Accumulator {
    theta_bins: usize,
    rho_bins: usize,
    rho_max: i64,
    trig: Vec<(f64, f64)>,
    votes: Vec<u32>,
}

impl Accumulator {
    fn new(width: usize, height: usize, theta_bins: usize) -> Self {
        let rho_max = ((width * width + height * height) as f64).sqrt().ceil() as i64;
        let rho_bins = (2 * rho_max + 1) as usize;
        let trig = (0..theta_bins)
            .map(|t| {
                let theta = t as f64 * PI / theta_bins as f64;
                (theta.cos(), theta.sin())
            })
            .collect();
        Self {
            theta_bins,
            rho_bins,
            rho_max,
            trig,
            votes: vec![0; theta_bins * rho_bins],
        }
    }

    #[inline]
    fn at(&self, t: usize, r: usize) -> u32 {
        self.votes[t * self.rho_bins + r]
    }

    fn vote(&mut self, x: f64, y: f64) {
        for t in 0..self.theta_bins {
            let (c, s) = self.trig[t];
            let r = ((x * c + y * s).round() as i64 + self.rho_max) as usize;
            self.votes[t * self.rho_bins + r] += 1;
        }
    }

    /// Neighbour across the `theta = 0 / pi` seam, where rho flips sign.
    fn neighbour(&self, t: usize, r: usize, dt: i64, dr: i64) -> Option<u32> {
        let mut tt = t as i64 + dt;
        let mut rr = r as i64 + dr;
        if tt < 0 || tt >= self.theta_bins as i64 {
            tt = tt.rem_euclid(self.theta_bins as i64);
            rr = 2 * self.rho_max - rr;
        }
        (0..self.rho_bins as i64)
            .contains(&rr)
            .then(|| self.at(tt as usize, rr as usize))
    }

    fn line(&self, t: usize, r: usize) -> HoughLine {
        HoughLine::new(
            r as f64 - self.rho_max as f64,
            t as f64 * PI / self.theta_bins as f64,
            self.at(t, r),
        )
    }
}

/// Strongest distinct Hough lines, most votes first.
pub fn hough_lines(grad: &Gradients, params: &EdgeThresholds) -> Vec<HoughLine> {
    let max_mag = grad.max_magnitude() as f64;
    let threshold = (params.edge_threshold_frac * max_mag).max(params.min_edge_magnitude);
    if max_mag < threshold || params.theta_bins == 0 {
        return Vec::new();
    }
    let mut acc = Accumulator::new(grad.width, grad.height, params.theta_bins);
    let stride = params.pixel_stride.max(1);
    for y in (0..grad.height).step_by(stride) {
        for x in (0..grad.width).step_by(stride) {
            if grad.mag[y * grad.width + x] as f64 >= threshold {
                acc.vote(x as f64, y as f64);
            }
        }
    }

    let max_votes = acc.votes.iter().copied().max().unwrap_or(0);
    let floor = ((params.vote_threshold_frac * max_votes as f64).ceil() as u32).max(params.min_votes);
    if max_votes < floor {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    for t in 0..acc.theta_bins {
        for r in 0..acc.rho_bins {
            let v = acc.at(t, r);
            if v < floor {
                continue;
            }
            let mut is_peak = true;
            'nb: for dt in -1..=1i64 {
                for dr in -1..=1i64 {
                    if (dt, dr) == (0, 0) {
                        continue;
                    }
                    if let Some(n) = acc.neighbour(t, r, dt, dr) {
                        // plateaus keep their first cell only
                        let before = dt < 0 || (dt == 0 && dr < 0);
                        if n > v || (before && n == v) {
                            is_peak = false;
                            break 'nb;
                        }
                    }
                }
            }
            if is_peak {
                peaks.push(acc.line(t, r));
            }
        }
    }
    peaks.sort_by(|a, b| b.votes.cmp(&a.votes));

    let dup_theta = params.duplicate_theta_deg.to_radians();
    let mut lines: Vec<HoughLine> = Vec::new();
    for p in peaks {
        if lines.len() >= params.max_lines {
            break;
        }
        if !lines
            .iter()
            .any(|l| is_duplicate(l, &p, dup_theta, params.duplicate_rho_px))
        {
            lines.push(p);
        }
    }
    lines
}

fn is_duplicate(a: &HoughLine, b: &HoughLine, dtheta: f64, drho: f64) -> bool {
    let d = (a.theta - b.theta).abs();
    if d < dtheta {
        return (a.rho - b.rho).abs() < drho;
    }
    // same line seen from the other side of the theta seam
    if PI - d < dtheta {
        return (a.rho + b.rho).abs() < drho;
    }
    false
}

/// `(horizontal, vertical)` lines within `tolerance_deg` of each axis.
pub fn split_orientations(
    lines: &[HoughLine],
    tolerance_deg: f64,
) -> (Vec<HoughLine>, Vec<HoughLine>) {
    let tol = tolerance_deg.to_radians();
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for l in lines {
        if (l.theta - PI / 2.0).abs() <= tol {
            horizontal.push(*l);
        } else if l.theta <= tol || l.theta >= PI - tol {
            vertical.push(*l);
        }
    }
    (horizontal, vertical)
}

/// A quad spanned by two horizontal and two vertical lines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeQuad {
    pub quad: Quad,
    pub score: f64,
}

/// Score every (h-pair × v-pair) quad; best first. `expected_aspect` is the
/// marker's long/short side ratio; the aspect limit scales with it.
pub fn assemble_quads(
    horizontal: &[HoughLine],
    vertical: &[HoughLine],
    width: usize,
    height: usize,
    expected_aspect: f64,
    params: &EdgeThresholds,
) -> Vec<EdgeQuad> {
    let expected = if expected_aspect.is_finite() {
        expected_aspect.max(1.0)
    } else {
        1.0
    };
    let bounds = BoundingBox {
        min: Point2::new(0.0, 0.0),
        max: Point2::new(width as f64, height as f64),
    }
    .expanded(params.bounds_margin_frac);
    let max_votes = horizontal
        .iter()
        .chain(vertical)
        .map(|l| l.votes)
        .max()
        .unwrap_or(1)
        .max(1) as f64;
    let image_side = width.min(height) as f64;

    let mut out = Vec::new();
    for (i, h1) in horizontal.iter().enumerate() {
        for h2 in &horizontal[i + 1..] {
            for (k, v1) in vertical.iter().enumerate() {
                for v2 in &vertical[k + 1..] {
                    let corners = [
                        h1.intersect(v1),
                        h1.intersect(v2),
                        h2.intersect(v2),
                        h2.intersect(v1),
                    ];
                    let Some(corners) = collect4(corners) else {
                        continue;
                    };
                    if !corners.iter().all(|p| bounds.contains(*p)) {
                        continue;
                    }
                    let quad = Quad::from_unordered(corners);
                    if !quad.is_convex() || quad.min_side() < params.min_side_px {
                        continue;
                    }
                    let aspect = quad.aspect_ratio();
                    if aspect > params.max_aspect * expected {
                        continue;
                    }
                    let deviation = (aspect / expected).max(expected / aspect);
                    let shape = if params.max_aspect > 1.0 {
                        (1.0 - (deviation - 1.0) / (params.max_aspect - 1.0)).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    let votes = (h1.votes + h2.votes + v1.votes + v2.votes) as f64 / 4.0;
                    let size = (quad.mean_side() / image_side).min(1.0);
                    let score = 0.4 * shape + 0.3 * votes / max_votes + 0.3 * size;
                    out.push(EdgeQuad { quad, score });
                }
            }
        }
    }
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out.truncate(params.max_candidates);
    out
}

fn collect4(c: [Option<Point2<f64>>; 4]) -> Option<[Point2<f64>; 4]> {
    Some([c[0]?, c[1]?, c[2]?, c[3]?])
}

/// Full edge-line pipeline on an RGBA view.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(w = img.width(), h = img.height()))
)]
pub fn detect_edge_quads(
    img: &RgbaImageView<'_>,
    expected_aspect: f64,
    params: &EdgeThresholds,
) -> Vec<EdgeQuad> {
    let grad = sobel(img);
    let lines = hough_lines(&grad, params);
    let (horizontal, vertical) = split_orientations(&lines, params.axis_tolerance_deg);
    let quads = assemble_quads(
        &horizontal,
        &vertical,
        img.width(),
        img.height(),
        expected_aspect,
        params,
    );
    log::debug!(
        "edges: {} lines ({} h, {} v), {} quads",
        lines.len(),
        horizontal.len(),
        vertical.len(),
        quads.len()
    );
    quads
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerscale_core::RgbaImage;

    fn dark_square(w: usize, h: usize, x0: usize, y0: usize, side: usize) -> RgbaImage {
        let mut img = RgbaImage::filled(w, h, [230, 230, 230, 255]).unwrap();
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.put_pixel(x, y, [20, 20, 20, 255]);
            }
        }
        img
    }

    #[test]
    fn sobel_is_zero_on_flat_images() {
        let img = RgbaImage::filled(16, 12, [90, 90, 90, 255]).unwrap();
        let g = sobel(&img.view());
        assert_eq!(g.max_magnitude(), 0.0);
        assert!(hough_lines(&g, &EdgeThresholds::default()).is_empty());
    }

    #[test]
    fn finds_the_four_sides_of_a_square() {
        let img = dark_square(240, 200, 60, 40, 120);
        let params = EdgeThresholds::default();
        let lines = hough_lines(&sobel(&img.view()), &params);
        let (h, v) = split_orientations(&lines, params.axis_tolerance_deg);
        assert!(h.len() >= 2 && v.len() >= 2, "{lines:?}");
        for l in h.iter().take(2) {
            assert!((l.theta - PI / 2.0).abs() < 0.02);
        }
    }

    #[test]
    fn best_quad_matches_the_square() {
        let img = dark_square(240, 200, 60, 40, 120);
        let quads = detect_edge_quads(&img.view(), 1.0, &EdgeThresholds::default());
        let best = quads.first().expect("quad");
        let expected = [(60.0, 40.0), (180.0, 40.0), (180.0, 160.0), (60.0, 160.0)];
        for (p, (x, y)) in best.quad.corners.iter().zip(expected) {
            assert!((p.x - x).abs() <= 2.0 && (p.y - y).abs() <= 2.0, "{p:?}");
        }
    }

    #[test]
    fn aspect_limit_follows_the_marker_shape() {
        let horizontal = [
            HoughLine::new(100.0, PI / 2.0, 40),
            HoughLine::new(300.0, PI / 2.0, 40),
        ];
        let vertical = [HoughLine::new(100.0, 0.0, 40), HoughLine::new(600.0, 0.0, 40)];
        let params = EdgeThresholds::default();

        assert!(assemble_quads(&horizontal, &vertical, 800, 500, 1.0, &params).is_empty());

        let quads = assemble_quads(&horizontal, &vertical, 800, 500, 2.5, &params);
        assert_eq!(quads.len(), 1);
        assert!((quads[0].quad.aspect_ratio() - 2.5).abs() < 1e-9);
        // full shape and vote credit, size 350 / 500
        assert!((quads[0].score - (0.4 + 0.3 + 0.3 * 0.7)).abs() < 1e-9, "{}", quads[0].score);
    }

    #[test]
    fn duplicates_across_the_theta_seam() {
        let a = HoughLine::new(50.0, 0.01, 10);
        let b = HoughLine::new(-52.0, PI - 0.01, 9);
        assert!(is_duplicate(&a, &b, 5f64.to_radians(), 10.0));
        let c = HoughLine::new(90.0, 0.02, 9);
        assert!(!is_duplicate(&a, &c, 5f64.to_radians(), 10.0));
    }
}
