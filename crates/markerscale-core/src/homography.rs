use crate::linalg::solve_gaussian;
use nalgebra::{DMatrix, Matrix2, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors of the low-level estimators. High-level entry points turn these
/// into an identity homography with zero quality.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least {needed} correspondences, got {got}")]
    InsufficientCorrespondences { needed: usize, got: usize },
    #[error("source and destination lengths differ ({src} vs {dst})")]
    LengthMismatch { src: usize, dst: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
    #[error("too few inliers (needed {needed}, found {found})")]
    InsufficientInliers { needed: usize, found: usize },
    #[error("estimation cancelled")]
    Cancelled,
}

/// Projective map `dst ~ H · src`, stored with `H[2][2] = 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// The eight free parameters, row-major, with `h22` implied to be 1.
    pub fn params(&self) -> [f64; 8] {
        let h = &self.h;
        [
            h[(0, 0)],
            h[(0, 1)],
            h[(0, 2)],
            h[(1, 0)],
            h[(1, 1)],
            h[(1, 2)],
            h[(2, 0)],
            h[(2, 1)],
        ]
    }

    pub fn from_params(p: &[f64; 8]) -> Self {
        Self::new(Matrix3::new(p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], 1.0))
    }

    /// Project a point; `None` when it maps to the line at infinity.
    #[inline]
    pub fn try_apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-15 {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    /// Project a point. Points at infinity come back as non-finite values.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h
            .try_inverse()
            .and_then(normalize_homography)
            .map(Self::new)
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }

    pub fn is_identity(&self, eps: f64) -> bool {
        (self.h - Matrix3::identity()).abs().max() <= eps
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Hartley normalization: translate to the centroid and scale so the mean
/// distance from it is `sqrt(2)`.
pub(crate) fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len().max(1) as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

pub(crate) fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !s.is_finite() {
        return None;
    }
    let out = h / s;
    out.iter().all(|v| v.is_finite()).then_some(out)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Reject coincident, collinear or non-finite point sets.
///
/// Uses the smaller eigenvalue of the normalized scatter matrix, so the
/// test is independent of the point scale.
fn check_point_spread(pts: &[Point2<f64>]) -> Result<(), HomographyError> {
    if pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(HomographyError::DegenerateGeometry("non-finite coordinates"));
    }
    let (norm, _) = normalize_points(pts);
    let mut scatter = Matrix2::zeros();
    for p in &norm {
        scatter += p.coords * p.coords.transpose();
    }
    scatter /= norm.len() as f64;
    let trace = scatter.trace();
    if trace < 1e-12 {
        return Err(HomographyError::DegenerateGeometry("coincident points"));
    }
    let eig = scatter.symmetric_eigenvalues();
    if eig.min() / trace < 1e-9 {
        return Err(HomographyError::DegenerateGeometry("collinear points"));
    }
    Ok(())
}

/// Reject 4-point sets containing a collinear triple.
fn check_no_collinear_triple(pts: &[Point2<f64>; 4]) -> Result<(), HomographyError> {
    let scale = pts
        .iter()
        .flat_map(|a| pts.iter().map(move |b| (*b - *a).norm_squared()))
        .fold(0.0_f64, f64::max);
    if !scale.is_finite() {
        return Err(HomographyError::DegenerateGeometry("non-finite coordinates"));
    }
    if scale < 1e-18 {
        return Err(HomographyError::DegenerateGeometry("coincident points"));
    }
    for skip in 0..4 {
        let tri: Vec<Point2<f64>> = (0..4).filter(|&i| i != skip).map(|i| pts[i]).collect();
        let a = tri[1] - tri[0];
        let b = tri[2] - tri[0];
        let cross = (a.x * b.y - a.y * b.x).abs();
        if cross < 1e-9 * scale {
            return Err(HomographyError::DegenerateGeometry("collinear triple"));
        }
    }
    Ok(())
}

/// Compute `H` such that `dst ~ H · src` from exactly four correspondences.
///
/// Fixes `h22 = 1`, forms the 8×8 normal equations of the Hartley-normalized
/// DLT system and solves them by Gaussian elimination.
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<Homography, HomographyError> {
    check_no_collinear_triple(src)?;
    check_no_collinear_triple(dst)?;

    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let ata = a.transpose() * a;
    let atb = a.transpose() * b;
    let x = solve_gaussian(ata, atb)
        .ok_or(HomographyError::DegenerateGeometry("singular 4-point system"))?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h = denormalize_homography(hn, t_src, t_dst)
        .and_then(normalize_homography)
        .ok_or(HomographyError::DegenerateGeometry("homography at infinity"))?;
    Ok(Homography::new(h))
}

/// Least-squares `H` with `dst ~ H · src` from four or more correspondences.
///
/// Exactly four points use [`homography_from_4pt`]; more points solve the
/// normalized `2N × 9` DLT system for its null vector by SVD.
pub fn estimate_homography_dlt(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Result<Homography, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(HomographyError::InsufficientCorrespondences {
            needed: 4,
            got: src.len(),
        });
    }

    if src.len() == 4 {
        let s: [Point2<f64>; 4] = [src[0], src[1], src[2], src[3]];
        let d: [Point2<f64>; 4] = [dst[0], dst[1], dst[2], dst[3]];
        return homography_from_4pt(&s, &d);
    }

    check_point_spread(src)?;
    check_point_spread(dst)?;

    let (r, tr) = normalize_points(src);
    let (i, ti) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let x = r[k].x;
        let y = r[k].y;
        let u = i[k].x;
        let v = i[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Null vector: right singular vector of the smallest singular value.
    let svd = a.svd(false, true);
    let vt = svd
        .v_t
        .ok_or(HomographyError::DegenerateGeometry("SVD did not converge"))?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(HomographyError::DegenerateGeometry("empty SVD"))?;
    let h = vt.row(min_idx);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let h = denormalize_homography(hn, tr, ti)
        .and_then(normalize_homography)
        .ok_or(HomographyError::DegenerateGeometry("homography at infinity"))?;
    Ok(Homography::new(h))
}

/// Estimate `dst ~ H · src`, falling back to the identity on any failure.
///
/// This is the entry point that never fails: callers inspect the reported
/// reprojection error or quality instead.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, dst), fields(points = src.len()))
)]
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Homography {
    match estimate_homography_dlt(src, dst) {
        Ok(h) => h,
        Err(err) => {
            log::debug!("homography estimation failed: {err}; using identity");
            Homography::identity()
        }
    }
}

/// Distance between `H · src` and `dst`.
#[inline]
pub fn reprojection_error(h: &Homography, src: Point2<f64>, dst: Point2<f64>) -> f64 {
    match h.try_apply(src) {
        Some(p) => (p - dst).norm(),
        None => f64::INFINITY,
    }
}

/// Root-mean-square reprojection error over all pairs (0 for empty input).
pub fn rms_reprojection_error(h: &Homography, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
    let n = src.len().min(dst.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = src
        .iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(h, *s, *d).powi(2))
        .sum();
    (sum / n as f64).sqrt()
}
