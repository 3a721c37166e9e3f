//! Marker-plane coordinates for a detected quad.
//!
//! Detectors and the precision pipeline address the printed layout in side
//! fractions; [`MarkerFrame`] maps them to pixels through the 4-corner
//! homography.

use nalgebra::Point2;

use markerscale_core::{homography_from_4pt, Homography, MarkerSpec, Quad};

/// Perspective map from marker-plane side fractions `(u, v) ∈ [0, 1]²` to
/// pixels, fixed by the four detected corners.
#[derive(Clone, Copy, Debug)]
pub struct MarkerFrame {
    h: Homography,
}

fn unit_square() -> [Point2<f64>; 4] {
    [
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
    ]
}

impl MarkerFrame {
    /// `None` when three corners are collinear.
    pub fn from_quad(quad: &Quad) -> Option<Self> {
        homography_from_4pt(&unit_square(), &quad.corners)
            .ok()
            .map(|h| Self { h })
    }

    /// Frame whose fiducial points land on `fiducials` (`[TL, TR, BR, BL]`).
    pub fn from_fiducials(fiducials: &[Point2<f64>; 4], spec: &MarkerSpec) -> Option<Self> {
        let d = 0.5 * spec.outer_band_frac;
        let inset = [
            Point2::new(d, d),
            Point2::new(1.0 - d, d),
            Point2::new(1.0 - d, 1.0 - d),
            Point2::new(d, 1.0 - d),
        ];
        homography_from_4pt(&inset, fiducials).ok().map(|h| Self { h })
    }

    /// The marker outline in pixels.
    pub fn quad(&self) -> Quad {
        Quad::from_ordered(unit_square().map(|p| self.h.apply(p)))
    }

    #[inline]
    pub fn point(&self, u: f64, v: f64) -> Point2<f64> {
        self.h.apply(Point2::new(u, v))
    }

    /// Pixel positions of the corner fiducials: the middle of the outer
    /// band at each corner, in `[TL, TR, BR, BL]` order.
    pub fn fiducial_points(&self, spec: &MarkerSpec) -> [Point2<f64>; 4] {
        let d = 0.5 * spec.outer_band_frac;
        [
            self.point(d, d),
            self.point(1.0 - d, d),
            self.point(1.0 - d, 1.0 - d),
            self.point(d, 1.0 - d),
        ]
    }

    /// Pixel length of one side fraction `frac` along the marker's mean side.
    pub fn scale(&self, frac: f64) -> f64 {
        let a = self.point(0.0, 0.0);
        let b = self.point(1.0, 1.0);
        let c = self.point(1.0, 0.0);
        let d = self.point(0.0, 1.0);
        frac * 0.5 * ((b - a).norm() + (d - c).norm()) / std::f64::consts::SQRT_2
    }
}
