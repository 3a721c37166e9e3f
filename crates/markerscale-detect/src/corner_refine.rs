//! Corner refinement by following the marker's outer border lines.
//!
//! A seed inside the outer dark band (a fiducial centre or an inset point
//! of a coarse quad) is pushed outwards along the compass directions facing
//! away from the marker. Each run of dark pixels ends on the outer border;
//! from there the border is traced in both directions, a line is fitted to
//! the traced points, and the corner is the intersection of the two most
//! perpendicular lines.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use markerscale_core::{distance, line_intersection, sample_luminosity, RgbaImageView};

use crate::params::CornerRefineThresholds;

/// Tracing step along a border line, in pixels.
const FOLLOW_STEP: f64 = 1.5;
/// Step of the sub-pixel crossing search, in pixels.
const CROSSING_STEP: f64 = 0.25;
/// Minimum light-minus-dark contrast for a usable border.
const MIN_BORDER_CONTRAST: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerType {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl CornerType {
    /// In `[TL, TR, BR, BL]` order.
    pub const ALL: [CornerType; 4] = [
        CornerType::TopLeft,
        CornerType::TopRight,
        CornerType::BottomRight,
        CornerType::BottomLeft,
    ];

    /// Diagonal pointing away from the marker interior (image y down).
    pub fn outward(self) -> Vector2<f64> {
        match self {
            CornerType::TopLeft => Vector2::new(-1.0, -1.0),
            CornerType::TopRight => Vector2::new(1.0, -1.0),
            CornerType::BottomRight => Vector2::new(1.0, 1.0),
            CornerType::BottomLeft => Vector2::new(-1.0, 1.0),
        }
    }

    /// Unit compass directions with a positive component along
    /// [`outward`](Self::outward): the two axis directions and the diagonal.
    pub fn search_directions(self) -> Vec<Vector2<f64>> {
        let out = self.outward();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        [
            (1.0, 0.0),
            (s, s),
            (0.0, 1.0),
            (-s, s),
            (-1.0, 0.0),
            (-s, -s),
            (0.0, -1.0),
            (s, -s),
        ]
        .into_iter()
        .map(|(x, y)| Vector2::new(x, y))
        .filter(|d| d.dot(&out) > 1e-9)
        .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerRefinement {
    pub point: Point2<f64>,
    /// False when the seed was returned unchanged.
    pub refined: bool,
    /// Border lines found around the seed.
    pub line_count: usize,
}

#[derive(Clone, Copy, Debug)]
struct BorderLine {
    point: Point2<f64>,
    dir: Vector2<f64>,
}

/// Refine one marker corner starting from `seed`.
///
/// `seed_size` sets the scan and tracing lengths and the maximum distance
/// the corner may move.
pub fn refine_corner(
    img: &RgbaImageView<'_>,
    seed: Point2<f64>,
    corner_type: CornerType,
    seed_size: f64,
    params: &CornerRefineThresholds,
) -> CornerRefinement {
    let unchanged = |line_count| CornerRefinement {
        point: seed,
        refined: false,
        line_count,
    };
    let seed_size = seed_size.max(4.0);
    let max_scan = (params.scan_factor * seed_size).ceil() as usize;

    let lines: Vec<BorderLine> = corner_type
        .search_directions()
        .into_iter()
        .filter_map(|dir| {
            let (start, threshold) = scan_outward(img, seed, dir, max_scan, params)?;
            trace_border(img, start, dir, threshold, seed_size, params)
        })
        .collect();

    let mut best: Option<(f64, Point2<f64>)> = None;
    let min_sep = params.min_angle_deg.min(180.0 - params.max_angle_deg);
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            // undirected lines: separation in [0, 90]
            let sep = a.dir.dot(&b.dir).abs().clamp(0.0, 1.0).acos().to_degrees();
            if sep < min_sep {
                continue;
            }
            let Some(p) = line_intersection(a.point, a.point + a.dir, b.point, b.point + b.dir)
            else {
                continue;
            };
            if best.is_none_or(|(s, _)| sep > s) {
                best = Some((sep, p));
            }
        }
    }

    match best {
        Some((_, p)) if distance(p, seed) <= params.max_distance_factor * seed_size => {
            CornerRefinement {
                point: p,
                refined: true,
                line_count: lines.len(),
            }
        }
        _ => unchanged(lines.len()),
    }
}

#[inline]
fn is_dark(img: &RgbaImageView<'_>, p: Point2<f64>, params: &CornerRefineThresholds) -> bool {
    sample_luminosity(img, p.x, p.y) < params.black_threshold
}

#[inline]
fn inside(img: &RgbaImageView<'_>, p: Point2<f64>) -> bool {
    p.x >= 0.0 && p.y >= 0.0 && p.x <= (img.width() - 1) as f64 && p.y <= (img.height() - 1) as f64
}

/// Walk from `seed` along `dir` until a dark run of sufficient length ends.
/// Returns the sub-pixel outer border point and the luminosity threshold
/// halfway between the run and what follows it.
fn scan_outward(
    img: &RgbaImageView<'_>,
    seed: Point2<f64>,
    dir: Vector2<f64>,
    max_scan: usize,
    params: &CornerRefineThresholds,
) -> Option<(Point2<f64>, f64)> {
    let mut run = 0usize;
    for step in 1..=max_scan {
        let p = seed + dir * step as f64;
        if !inside(img, p) {
            return None;
        }
        if is_dark(img, p, params) {
            run += 1;
            continue;
        }
        if run >= params.min_dark_run {
            let last_dark = seed + dir * (step - 1) as f64;
            let dark = sample_luminosity(img, last_dark.x - 2.0 * dir.x, last_dark.y - 2.0 * dir.y);
            let behind = p + dir * 2.0;
            let light = sample_luminosity(img, behind.x, behind.y);
            if light - dark < MIN_BORDER_CONTRAST {
                return None;
            }
            let threshold = 0.5 * (dark + light);
            let point = crossing_along(img, last_dark, dir, -1.0, 2.0, threshold)?;
            return Some((point, threshold));
        }
        run = 0;
    }
    None
}

/// First dark → light crossing of `threshold` on the segment
/// `center + dir * [from, to]`, linearly interpolated.
fn crossing_along(
    img: &RgbaImageView<'_>,
    center: Point2<f64>,
    dir: Vector2<f64>,
    from: f64,
    to: f64,
    threshold: f64,
) -> Option<Point2<f64>> {
    let steps = ((to - from) / CROSSING_STEP).round() as usize;
    let sample = |t: f64| {
        let p = center + dir * t;
        sample_luminosity(img, p.x, p.y)
    };
    let mut prev_t = from;
    let mut prev = sample(from);
    for i in 1..=steps {
        let t = from + i as f64 * CROSSING_STEP;
        let cur = sample(t);
        if prev < threshold && cur >= threshold {
            let frac = (threshold - prev) / (cur - prev);
            return Some(center + dir * (prev_t + frac * (t - prev_t)));
        }
        prev = cur;
        prev_t = t;
    }
    None
}

/// Trace the border through `start` in both directions perpendicular to
/// the scan direction and fit a line to the traced points.
fn trace_border(
    img: &RgbaImageView<'_>,
    start: Point2<f64>,
    scan_dir: Vector2<f64>,
    threshold: f64,
    seed_size: f64,
    params: &CornerRefineThresholds,
) -> Option<BorderLine> {
    let tangent = Vector2::new(-scan_dir.y, scan_dir.x);
    let steps = (params.follow_factor * seed_size / FOLLOW_STEP).ceil() as usize;
    let search = params.follow_search_px;
    let mut points = vec![start];
    for sign in [1.0, -1.0] {
        let mut cur = start;
        for _ in 0..steps {
            let ahead = cur + tangent * (sign * FOLLOW_STEP);
            if !inside(img, ahead) {
                break;
            }
            match crossing_along(img, ahead, scan_dir, -search, search, threshold) {
                Some(p) => {
                    points.push(p);
                    cur = p;
                }
                None => break,
            }
        }
    }
    if points.len() < params.min_line_points {
        return None;
    }
    fit_line(&points)
}

/// Total least-squares line through `points`.
fn fit_line(points: &[Point2<f64>]) -> Option<BorderLine> {
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - mx, p.y - my);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx + syy <= f64::EPSILON {
        return None;
    }
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some(BorderLine {
        point: Point2::new(mx, my),
        dir: Vector2::new(angle.cos(), angle.sin()),
    })
}
