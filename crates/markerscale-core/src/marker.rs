//! Physical description of the printed reference marker.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Side of the stock printed marker, in millimetres.
pub const DEFAULT_MARKER_SIDE_MM: f64 = 180.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MarkerSpecError {
    #[error("marker size must be positive and finite (width={width_mm}, height={height_mm})")]
    InvalidSize { width_mm: f64, height_mm: f64 },
    #[error("band fractions must be in (0, 0.5) and leave room for the pattern (outer={outer}, inner={inner})")]
    InvalidBands { outer: f64, inner: f64 },
    #[error("pattern region [{start}, {end}] must lie inside the inner bands")]
    InvalidPatternRegion { start: f64, end: f64 },
    #[error("pattern grid must have at least one cell")]
    EmptyGrid,
}

/// Immutable marker geometry, passed explicitly to every stage.
///
/// The printed marker is a square (or rectangle) with a dark outer band, a
/// light band, a dark central pattern region, then the mirrored light and
/// dark bands. Band widths are fractions of the side length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSpec {
    pub width_mm: f64,
    pub height_mm: f64,
    /// Width of the outer dark band as a fraction of the side.
    pub outer_band_frac: f64,
    /// Width of the light band inside it.
    pub inner_band_frac: f64,
    /// `[start, end]` of the internal pattern region, as side fractions.
    pub pattern_region: [f64; 2],
    /// Number of pattern cells per side.
    pub grid_cells: u32,
}

impl Default for MarkerSpec {
    fn default() -> Self {
        Self::square(DEFAULT_MARKER_SIDE_MM)
    }
}

impl MarkerSpec {
    pub fn square(side_mm: f64) -> Self {
        Self::rectangular(side_mm, side_mm)
    }

    pub fn rectangular(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
            outer_band_frac: 1.0 / 6.0,
            inner_band_frac: 1.0 / 6.0,
            pattern_region: [1.0 / 3.0, 2.0 / 3.0],
            grid_cells: 6,
        }
    }

    pub fn validate(&self) -> Result<(), MarkerSpecError> {
        let size_ok = |v: f64| v.is_finite() && v > 0.0;
        if !size_ok(self.width_mm) || !size_ok(self.height_mm) {
            return Err(MarkerSpecError::InvalidSize {
                width_mm: self.width_mm,
                height_mm: self.height_mm,
            });
        }
        let (outer, inner) = (self.outer_band_frac, self.inner_band_frac);
        let band_ok = |v: f64| v.is_finite() && v > 0.0 && v < 0.5;
        if !band_ok(outer) || !band_ok(inner) || outer + inner >= 0.5 {
            return Err(MarkerSpecError::InvalidBands { outer, inner });
        }
        let [start, end] = self.pattern_region;
        if !(start.is_finite() && end.is_finite()) || start < outer || end > 1.0 - outer || start >= end
        {
            return Err(MarkerSpecError::InvalidPatternRegion { start, end });
        }
        if self.grid_cells == 0 {
            return Err(MarkerSpecError::EmptyGrid);
        }
        Ok(())
    }

    /// Mean side length in millimetres.
    pub fn mean_side_mm(&self) -> f64 {
        0.5 * (self.width_mm + self.height_mm)
    }

    /// Real-world corners `[TL, TR, BR, BL]` with the origin at the top-left.
    pub fn real_corners(&self) -> [Point2<f64>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(self.width_mm, 0.0),
            Point2::new(self.width_mm, self.height_mm),
            Point2::new(0.0, self.height_mm),
        ]
    }

    /// Real-world position of a point given in side fractions.
    pub fn real_point(&self, u: f64, v: f64) -> Point2<f64> {
        Point2::new(u * self.width_mm, v * self.height_mm)
    }

    /// Side fractions at which the printed band boundaries sit, in order
    /// from one edge to the opposite one.
    pub fn transition_ratios(&self) -> [f64; 4] {
        let b1 = self.outer_band_frac;
        let b2 = b1 + self.inner_band_frac;
        [b1, b2, 1.0 - b2, 1.0 - b1]
    }

    /// Side fraction of the scan line used to find the band transitions:
    /// halfway between the light band and the marker centre.
    pub fn transition_scan_depth(&self) -> f64 {
        0.5 * (self.outer_band_frac + self.inner_band_frac + 0.5)
    }

    /// Size of one pattern cell as a side fraction.
    pub fn cell_frac(&self) -> f64 {
        (self.pattern_region[1] - self.pattern_region[0]) / self.grid_cells as f64
    }

    /// Long side over short side, as [`Quad::aspect_ratio`](crate::Quad::aspect_ratio)
    /// would measure it on an undistorted view.
    pub fn expected_aspect(&self) -> f64 {
        let lo = self.width_mm.min(self.height_mm);
        if lo <= f64::EPSILON {
            return f64::INFINITY;
        }
        self.width_mm.max(self.height_mm) / lo
    }
}
