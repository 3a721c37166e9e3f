//! Real-world measurements taken through a pixel → millimetre homography,
//! plus coarse quality heuristics on the detected marker quad.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{distance, polygon_area, Homography, Quad};

/// Cap on the reported relative uncertainty, in percent.
pub const MAX_UNCERTAINTY_PERCENT: f64 = 25.0;
/// Opposite-side ratio beyond which the quad counts as strongly distorted.
pub const DISTORTION_RATIO: f64 = 1.5;

/// Distance between two pixels after mapping both into real units.
pub fn real_distance(h: &Homography, p1: Point2<f64>, p2: Point2<f64>) -> f64 {
    distance(h.apply(p1), h.apply(p2))
}

/// A distance with a symmetric uncertainty band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceMeasurement {
    pub distance: f64,
    pub uncertainty: f64,
    pub min: f64,
    pub max: f64,
}

pub fn distance_with_uncertainty(
    h: &Homography,
    p1: Point2<f64>,
    p2: Point2<f64>,
    uncertainty_percent: f64,
) -> DistanceMeasurement {
    let distance = real_distance(h, p1, p2);
    let uncertainty = distance * uncertainty_percent / 100.0;
    DistanceMeasurement {
        distance,
        uncertainty,
        min: distance - uncertainty,
        max: distance + uncertainty,
    }
}

/// Area of a pixel polygon in squared real units.
pub fn real_area(h: &Homography, polygon: &[Point2<f64>]) -> f64 {
    let mapped: Vec<Point2<f64>> = polygon.iter().map(|&p| h.apply(p)).collect();
    polygon_area(&mapped)
}

/// Score in `[0, 100]` from the mean reprojection error of `src → dst`:
/// 100 at zero error, 0 at 20 units.
pub fn homography_quality_percent(h: &Homography, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
    let n = src.len().min(dst.len());
    if n == 0 {
        return 0.0;
    }
    let mean = src
        .iter()
        .zip(dst)
        .map(|(s, d)| distance(h.apply(*s), *d))
        .sum::<f64>()
        / n as f64;
    if !mean.is_finite() {
        return 0.0;
    }
    (100.0 - 5.0 * mean).clamp(0.0, 100.0)
}

/// Relative measurement uncertainty in percent.
///
/// Starts at `(100 - quality) / 10` and grows with the perspective
/// distortion of the marker quad; capped at [`MAX_UNCERTAINTY_PERCENT`].
pub fn estimate_uncertainty_percent(quality_percent: f64, quad: &Quad) -> f64 {
    let mut pct = (100.0 - quality_percent.clamp(0.0, 100.0)) / 10.0;
    let [top, right, bottom, left] = quad.sides();
    let ratio = |a: f64, b: f64| {
        let lo = a.min(b);
        if lo <= f64::EPSILON {
            f64::INFINITY
        } else {
            a.max(b) / lo
        }
    };
    let worst = ratio(top, bottom).max(ratio(left, right));
    if worst > DISTORTION_RATIO {
        pct += (worst - 1.0) * 3.0;
    }
    pct.min(MAX_UNCERTAINTY_PERCENT)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Mm,
    Cm,
    M,
}

impl LengthUnit {
    fn per_mm(self) -> f64 {
        match self {
            LengthUnit::Mm => 1.0,
            LengthUnit::Cm => 0.1,
            LengthUnit::M => 0.001,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::M => "m",
        }
    }
}

/// Render `value ± uncertainty unit`, one decimal when the uncertainty is
/// below one unit.
pub fn format_measurement(distance_mm: f64, uncertainty_percent: f64, unit: LengthUnit) -> String {
    let value = distance_mm * unit.per_mm();
    let uncertainty = value * uncertainty_percent / 100.0;
    let decimals = if uncertainty < 1.0 { 1 } else { 0 };
    format!(
        "{value:.decimals$} ± {uncertainty:.decimals$} {}",
        unit.suffix()
    )
}

/// Pixel-space measurements of a detected marker quad.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadMeasurements {
    /// `[top, right, bottom, left]` in pixels.
    pub sides: [f64; 4],
    pub mean_side_px: f64,
    pub px_per_mm: f64,
    /// Interior angles in degrees.
    pub angles: [f64; 4],
    pub center: Point2<f64>,
}

impl QuadMeasurements {
    pub fn from_quad(quad: &Quad, side_mm: f64) -> Self {
        let sides = quad.sides();
        let mean_side_px = quad.mean_side();
        Self {
            sides,
            mean_side_px,
            px_per_mm: if side_mm > 0.0 {
                mean_side_px / side_mm
            } else {
                0.0
            },
            angles: quad.interior_angles(),
            center: quad.centroid(),
        }
    }
}

/// Coarse marker tilt in degrees, from opposite-side ratios and the slope of
/// the top edge. Not a camera pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tilt {
    /// Forward/backward tilt (top vs bottom width).
    pub rot_x: f64,
    /// Left/right tilt (left vs right height).
    pub rot_y: f64,
    /// In-plane rotation of the top edge.
    pub rot_z: f64,
}

pub fn estimate_tilt(quad: &Quad) -> Tilt {
    let [top, right, bottom, left] = quad.sides();
    let tilt_from = |a: f64, b: f64| {
        if b <= f64::EPSILON {
            0.0
        } else {
            (a / b - 1.0).atan2(0.5).to_degrees()
        }
    };
    let d = quad.top_right() - quad.top_left();
    Tilt {
        rot_x: tilt_from(top, bottom),
        rot_y: tilt_from(left, right),
        rot_z: d.y.atan2(d.x).to_degrees(),
    }
}

/// Detection quality in `[0, 100]`: penalises small markers and strong
/// out-of-plane tilt.
pub fn detection_quality_score(mean_side_px: f64, tilt: &Tilt) -> f64 {
    let mut score = 100.0;
    if mean_side_px < 50.0 {
        score -= 40.0;
    } else if mean_side_px < 100.0 {
        score -= 20.0;
    }
    score -= 0.5 * tilt.rot_x.abs();
    score -= 0.5 * tilt.rot_y.abs();
    score.clamp(0.0, 100.0)
}
