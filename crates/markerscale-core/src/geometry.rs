//! 2D geometry shared by the detectors and the estimators.
//!
//! Points are plain `nalgebra::Point2<f64>`; their unit (pixels or
//! millimetres) is implied by the caller.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

const PARALLEL_EPS: f64 = 1e-10;

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: Point2<f64>, b: Point2<f64>) -> f64 {
    (b - a).norm()
}

/// Angle at `vertex` between the rays towards `p1` and `p2`, in degrees.
///
/// Returns `0.0` when either ray has zero length.
pub fn angle_at(p1: Point2<f64>, vertex: Point2<f64>, p2: Point2<f64>) -> f64 {
    let a = p1 - vertex;
    let b = p2 - vertex;
    let na = a.norm();
    let nb = b.norm();
    if na < f64::EPSILON || nb < f64::EPSILON {
        return 0.0;
    }
    (a.dot(&b) / (na * nb)).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Absolute polygon area (shoelace formula).
pub fn polygon_area(points: &[Point2<f64>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        acc += p.x * q.y - q.x * p.y;
    }
    acc.abs() * 0.5
}

/// Intersection of the infinite line through `p1, p2` with the infinite
/// line through `p3, p4`. `None` when the lines are (nearly) parallel.
pub fn line_intersection(
    p1: Point2<f64>,
    p2: Point2<f64>,
    p3: Point2<f64>,
    p4: Point2<f64>,
) -> Option<Point2<f64>> {
    let d = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    let scale = (p2 - p1).norm() * (p4 - p3).norm();
    if d.abs() <= PARALLEL_EPS * scale.max(1.0) {
        return None;
    }
    let a = p1.x * p2.y - p1.y * p2.x;
    let b = p3.x * p4.y - p3.y * p4.x;
    let x = (a * (p3.x - p4.x) - (p1.x - p2.x) * b) / d;
    let y = (a * (p3.y - p4.y) - (p1.y - p2.y) * b) / d;
    (x.is_finite() && y.is_finite()).then(|| Point2::new(x, y))
}

/// Mean of a point set. Returns the origin for an empty slice.
pub fn centroid(points: &[Point2<f64>]) -> Point2<f64> {
    if points.is_empty() {
        return Point2::origin();
    }
    let sum = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / points.len() as f64)
}

/// Order four points as `[TopLeft, TopRight, BottomRight, BottomLeft]`.
///
/// Points are sorted by their angle around the centroid (clockwise on screen,
/// y pointing down) and rotated so that the point with minimal `x + y` comes
/// first; ties go to the smaller `y`.
pub fn order_corners(points: [Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let c = centroid(&points);
    let mut sorted = points;
    sorted.sort_by(|a, b| {
        let ta = (a.y - c.y).atan2(a.x - c.x);
        let tb = (b.y - c.y).atan2(b.x - c.x);
        ta.total_cmp(&tb)
    });

    let extent = sorted
        .iter()
        .map(|p| (p - c).norm())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let tie_eps = 1e-9 * extent;

    let mut first = 0;
    for (i, p) in sorted.iter().enumerate().skip(1) {
        let s = p.x + p.y;
        let best = sorted[first].x + sorted[first].y;
        if s < best - tie_eps || ((s - best).abs() <= tie_eps && p.y < sorted[first].y) {
            first = i;
        }
    }

    [
        sorted[first],
        sorted[(first + 1) % 4],
        sorted[(first + 2) % 4],
        sorted[(first + 3) % 4],
    ]
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, p: Point2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Grow the box by `frac` of its size on every side.
    pub fn expanded(&self, frac: f64) -> Self {
        let dx = self.width() * frac;
        let dy = self.height() * frac;
        Self {
            min: Point2::new(self.min.x - dx, self.min.y - dy),
            max: Point2::new(self.max.x + dx, self.max.y + dy),
        }
    }
}

/// Quadrilateral with corners in canonical `[TL, TR, BR, BL]` order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point2<f64>; 4],
}

impl Quad {
    /// Build a quad from four points in any order.
    pub fn from_unordered(points: [Point2<f64>; 4]) -> Self {
        Self {
            corners: order_corners(points),
        }
    }

    /// Build a quad from corners already in `[TL, TR, BR, BL]` order.
    pub fn from_ordered(corners: [Point2<f64>; 4]) -> Self {
        Self { corners }
    }

    pub fn top_left(&self) -> Point2<f64> {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point2<f64> {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point2<f64> {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point2<f64> {
        self.corners[3]
    }

    /// Side lengths `[top, right, bottom, left]`.
    pub fn sides(&self) -> [f64; 4] {
        let c = &self.corners;
        [
            distance(c[0], c[1]),
            distance(c[1], c[2]),
            distance(c[2], c[3]),
            distance(c[3], c[0]),
        ]
    }

    pub fn min_side(&self) -> f64 {
        self.sides().into_iter().fold(f64::INFINITY, f64::min)
    }

    pub fn max_side(&self) -> f64 {
        self.sides().into_iter().fold(0.0, f64::max)
    }

    pub fn mean_side(&self) -> f64 {
        self.sides().iter().sum::<f64>() / 4.0
    }

    /// Ratio of the mean horizontal extent to the mean vertical extent,
    /// folded so the result is always `>= 1`.
    pub fn aspect_ratio(&self) -> f64 {
        let [top, right, bottom, left] = self.sides();
        let w = 0.5 * (top + bottom);
        let h = 0.5 * (left + right);
        let (lo, hi) = if w < h { (w, h) } else { (h, w) };
        if lo <= f64::EPSILON {
            return f64::INFINITY;
        }
        hi / lo
    }

    /// Interior angles in degrees, one per corner.
    pub fn interior_angles(&self) -> [f64; 4] {
        let c = &self.corners;
        [
            angle_at(c[3], c[0], c[1]),
            angle_at(c[0], c[1], c[2]),
            angle_at(c[1], c[2], c[3]),
            angle_at(c[2], c[3], c[0]),
        ]
    }

    pub fn centroid(&self) -> Point2<f64> {
        centroid(&self.corners)
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.corners)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut min = self.corners[0];
        let mut max = self.corners[0];
        for p in &self.corners[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        BoundingBox { min, max }
    }

    /// Bilinear interpolation inside the quad; `(0, 0)` is the top-left
    /// corner and `(1, 1)` the bottom-right one.
    pub fn point_at(&self, u: f64, v: f64) -> Point2<f64> {
        let [tl, tr, br, bl] = self.corners;
        let top = tl + (tr - tl) * u;
        let bottom = bl + (br - bl) * u;
        top + (bottom - top) * v
    }

    /// True when every turn has the same orientation.
    pub fn is_convex(&self) -> bool {
        let c = &self.corners;
        let mut sign = 0.0_f64;
        for i in 0..4 {
            let a = c[(i + 1) % 4] - c[i];
            let b = c[(i + 2) % 4] - c[(i + 1) % 4];
            let cross = a.x * b.y - a.y * b.x;
            if cross.abs() <= f64::EPSILON {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }
}

/// A line in Hough normal form: `x·cos(theta) + y·sin(theta) = rho`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HoughLine {
    pub rho: f64,
    /// Normal angle in `[0, π)`.
    pub theta: f64,
    pub votes: u32,
}

impl HoughLine {
    pub fn new(rho: f64, theta: f64, votes: u32) -> Self {
        Self { rho, theta, votes }
    }

    /// Intersection with another line, `None` when parallel.
    pub fn intersect(&self, other: &HoughLine) -> Option<Point2<f64>> {
        let (s1, c1) = self.theta.sin_cos();
        let (s2, c2) = other.theta.sin_cos();
        let det = c1 * s2 - s1 * c2;
        if det.abs() < 1e-9 {
            return None;
        }
        let x = (self.rho * s2 - other.rho * s1) / det;
        let y = (other.rho * c1 - self.rho * c2) / det;
        Some(Point2::new(x, y))
    }

    /// Signed distance of `p` from the line.
    pub fn signed_distance(&self, p: Point2<f64>) -> f64 {
        let (s, c) = self.theta.sin_cos();
        p.x * c + p.y * s - self.rho
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(cx: f64, cy: f64, half: f64, angle: f64) -> [Point2<f64>; 4] {
        let (s, c) = angle.sin_cos();
        [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(x, y)| {
            let (x, y) = (x * half, y * half);
            Point2::new(cx + c * x - s * y, cy + s * x + c * y)
        })
    }

    #[test]
    fn ordering_is_independent_of_input_permutation() {
        let expected = square(200.0, 150.0, 50.0, 0.0);
        let perms = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [2, 0, 3, 1],
            [1, 3, 0, 2],
            [2, 3, 0, 1],
        ];
        for perm in perms {
            let input = perm.map(|i| expected[i]);
            assert_eq!(order_corners(input), expected, "perm {perm:?}");
        }
    }

    #[test]
    fn ordering_survives_quarter_and_half_turns() {
        for turns in [1.0, 2.0] {
            let pts = square(320.0, 240.0, 80.0, turns * std::f64::consts::FRAC_PI_2);
            let ordered = order_corners(pts);
            assert!(ordered[0].x < ordered[1].x && ordered[0].y < ordered[3].y);
            assert!(ordered[2].x > ordered[3].x && ordered[2].y > ordered[1].y);
        }
    }

    #[test]
    fn rectangle_ordering_is_tl_tr_br_bl() {
        let pts = [
            Point2::new(300.0, 20.0),
            Point2::new(10.0, 200.0),
            Point2::new(300.0, 200.0),
            Point2::new(10.0, 20.0),
        ];
        let q = Quad::from_unordered(pts);
        assert_eq!(q.top_left(), Point2::new(10.0, 20.0));
        assert_eq!(q.top_right(), Point2::new(300.0, 20.0));
        assert_eq!(q.bottom_right(), Point2::new(300.0, 200.0));
        assert_eq!(q.bottom_left(), Point2::new(10.0, 200.0));
    }

    #[test]
    fn quad_metrics() {
        let q = Quad::from_unordered(square(0.0, 0.0, 10.0, 0.0));
        assert_relative_eq!(q.area(), 400.0, epsilon = 1e-9);
        assert_relative_eq!(q.aspect_ratio(), 1.0, epsilon = 1e-12);
        for a in q.interior_angles() {
            assert_relative_eq!(a, 90.0, epsilon = 1e-9);
        }
        assert!(q.is_convex());
        let mid = q.point_at(0.5, 0.5);
        assert_relative_eq!(mid.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(mid.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn intersections() {
        let p = line_intersection(
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
            Point2::new(10.0, 0.0),
        )
        .expect("crossing lines");
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 5.0, epsilon = 1e-12);

        assert!(line_intersection(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
        )
        .is_none());

        let h = HoughLine::new(40.0, std::f64::consts::FRAC_PI_2, 10);
        let v = HoughLine::new(25.0, 0.0, 10);
        let x = h.intersect(&v).expect("perpendicular");
        assert_relative_eq!(x.x, 25.0, epsilon = 1e-9);
        assert_relative_eq!(x.y, 40.0, epsilon = 1e-9);
    }
}
