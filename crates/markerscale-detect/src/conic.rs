//! Circle and ellipse fitting for fiducial centres.
//!
//! Blob centroids drift towards whichever side of a printed dot is better
//! exposed; fitting the dot outline recovers the centre to sub-pixel
//! accuracy. The ellipse fit is the direct least-squares method of
//! Fitzgibbon, Pilu and Fisher, solved on Hartley-normalized coordinates.

use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use markerscale_core::solve_gaussian;

/// Fitted circle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub r: f64,
}

impl Circle {
    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.cx, self.cy)
    }
}

/// Fitted ellipse; `a >= b`, `angle` is the direction of the `a` axis in
/// radians.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    pub a: f64,
    pub b: f64,
    pub angle: f64,
}

impl Ellipse {
    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.cx, self.cy)
    }
}

/// Which model [`fit_center`] uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    Circle,
    Ellipse,
    /// Circle first; ellipse when the circle residual is large.
    #[default]
    Auto,
}

/// Relative circle residual above which `Auto` switches to the ellipse.
const AUTO_ELLIPSE_RESIDUAL: f64 = 0.05;

/// Farthest point from `center` in each of `sectors` equal angular sectors.
///
/// Empty sectors are skipped, so the result may hold fewer than `sectors`
/// points.
pub fn sample_border_by_sector(
    points: &[Point2<f64>],
    center: Point2<f64>,
    sectors: usize,
) -> Vec<Point2<f64>> {
    if sectors == 0 {
        return Vec::new();
    }
    let mut best: Vec<Option<(f64, Point2<f64>)>> = vec![None; sectors];
    let step = std::f64::consts::TAU / sectors as f64;
    for &p in points {
        let d = p - center;
        let r2 = d.norm_squared();
        if r2 <= f64::EPSILON {
            continue;
        }
        let angle = d.y.atan2(d.x).rem_euclid(std::f64::consts::TAU);
        let idx = ((angle / step) as usize).min(sectors - 1);
        if best[idx].is_none_or(|(r, _)| r2 > r) {
            best[idx] = Some((r2, p));
        }
    }
    best.into_iter().flatten().map(|(_, p)| p).collect()
}

/// Algebraic (Kåsa) circle fit. Returns the circle and its RMS radial
/// residual.
pub fn fit_circle_kasa(points: &[Point2<f64>]) -> Option<(Circle, f64)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;

    // x² + y² + D x + E y + F = 0 on centred coordinates
    let mut ata = SMatrix::<f64, 3, 3>::zeros();
    let mut atb = SVector::<f64, 3>::zeros();
    for p in points {
        let (x, y) = (p.x - mx, p.y - my);
        let row = SVector::<f64, 3>::new(x, y, 1.0);
        ata += row * row.transpose();
        atb -= row * (x * x + y * y);
    }
    let sol = solve_gaussian(ata, atb)?;
    let (d, e, f) = (sol[0], sol[1], sol[2]);
    let r2 = 0.25 * (d * d + e * e) - f;
    if r2.is_nan() || r2 <= 0.0 {
        return None;
    }
    let circle = Circle {
        cx: mx - 0.5 * d,
        cy: my - 0.5 * e,
        r: r2.sqrt(),
    };
    let c = circle.center();
    let residual = (points
        .iter()
        .map(|p| {
            let dr = (p - c).norm() - circle.r;
            dr * dr
        })
        .sum::<f64>()
        / n)
        .sqrt();
    Some((circle, residual))
}

/// Direct least-squares ellipse fit; needs at least six points.
pub fn fit_ellipse_direct(points: &[Point2<f64>]) -> Option<Ellipse> {
    if points.len() < 6 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;

    // Scatter blocks of the design matrix [x², xy, y² | x, y, 1].
    let mut s1 = Matrix3::<f64>::zeros();
    let mut s2 = Matrix3::<f64>::zeros();
    let mut s3 = Matrix3::<f64>::zeros();
    for p in points {
        let (x, y) = ((p.x - mx) * s, (p.y - my) * s);
        let quad = Vector3::new(x * x, x * y, y * y);
        let lin = Vector3::new(x, y, 1.0);
        s1 += quad * quad.transpose();
        s2 += quad * lin.transpose();
        s3 += lin * lin.transpose();
    }
    let s3_inv = (s3 + Matrix3::identity() * 1e-12).try_inverse()?;
    let t = -s3_inv * s2.transpose();
    let reduced = s1 + s2 * t;

    // Inverse of the constraint matrix [[0, 0, 2], [0, -1, 0], [2, 0, 0]].
    let c1_inv = Matrix3::new(0.0, 0.0, 0.5, 0.0, -1.0, 0.0, 0.5, 0.0, 0.0);
    let system = c1_inv * reduced;

    let mut best: Option<(f64, Vector3<f64>)> = None;
    for ev in system.complex_eigenvalues().iter() {
        if ev.im.abs() > 1e-9 * (1.0 + ev.re.abs()) {
            continue;
        }
        let Some(a1) = null_vector(&(system - Matrix3::identity() * ev.re)) else {
            continue;
        };
        if 4.0 * a1[0] * a1[2] - a1[1] * a1[1] <= 0.0 {
            continue;
        }
        if best.is_none_or(|(l, _)| ev.re.abs() < l) {
            best = Some((ev.re.abs(), a1));
        }
    }
    let (_, a1) = best?;
    let a2 = t * a1;
    let e = conic_to_ellipse([a1[0], a1[1], a1[2], a2[0], a2[1], a2[2]])?;
    Some(Ellipse {
        cx: e.cx / s + mx,
        cy: e.cy / s + my,
        a: e.a / s,
        b: e.b / s,
        angle: e.angle,
    })
}

/// Null vector of a rank-2 matrix: the largest cross product of two rows.
fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let rows = [
        m.row(0).transpose(),
        m.row(1).transpose(),
        m.row(2).transpose(),
    ];
    let v = [
        rows[0].cross(&rows[1]),
        rows[0].cross(&rows[2]),
        rows[1].cross(&rows[2]),
    ]
    .into_iter()
    .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;
    let norm = v.norm();
    (norm > 1e-300 && norm.is_finite()).then(|| v / norm)
}

/// Geometric parameters of `A x² + B xy + C y² + D x + E y + F = 0`.
fn conic_to_ellipse(c: [f64; 6]) -> Option<Ellipse> {
    let [a, b, cc, d, e, f] = c;
    let den = 4.0 * a * cc - b * b;
    if den <= 0.0 {
        return None;
    }
    let cx = (b * e - 2.0 * cc * d) / den;
    let cy = (b * d - 2.0 * a * e) / den;
    let f0 = a * cx * cx + b * cx * cy + cc * cy * cy + d * cx + e * cy + f;

    let mean = 0.5 * (a + cc);
    let half = 0.5 * ((a - cc).powi(2) + b * b).sqrt();
    let (l1, l2) = (mean + half, mean - half);
    let mut angle = 0.5 * b.atan2(a - cc);
    let (sa, sb) = (-f0 / l1, -f0 / l2);
    if sa.is_nan() || sb.is_nan() || sa <= 0.0 || sb <= 0.0 {
        return None;
    }
    let (mut ax, mut bx) = (sa.sqrt(), sb.sqrt());
    if ax < bx {
        std::mem::swap(&mut ax, &mut bx);
        angle += std::f64::consts::FRAC_PI_2;
    }
    if angle > std::f64::consts::FRAC_PI_2 {
        angle -= std::f64::consts::PI;
    } else if angle <= -std::f64::consts::FRAC_PI_2 {
        angle += std::f64::consts::PI;
    }
    let out = Ellipse {
        cx,
        cy,
        a: ax,
        b: bx,
        angle,
    };
    [out.cx, out.cy, out.a, out.b]
        .iter()
        .all(|v| v.is_finite())
        .then_some(out)
}

/// Centre of an outline sampled by [`sample_border_by_sector`].
pub fn fit_center(border: &[Point2<f64>], mode: FitMode) -> Option<Point2<f64>> {
    match mode {
        FitMode::Circle => fit_circle_kasa(border).map(|(c, _)| c.center()),
        FitMode::Ellipse => fit_ellipse_direct(border)
            .map(|e| e.center())
            .or_else(|| fit_circle_kasa(border).map(|(c, _)| c.center())),
        FitMode::Auto => match fit_circle_kasa(border) {
            Some((circle, residual)) if residual <= AUTO_ELLIPSE_RESIDUAL * circle.r => {
                Some(circle.center())
            }
            Some((circle, _)) => Some(
                fit_ellipse_direct(border)
                    .map(|e| e.center())
                    .unwrap_or(circle.center()),
            ),
            None => fit_ellipse_direct(border).map(|e| e.center()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ellipse_points(e: &Ellipse, n: usize) -> Vec<Point2<f64>> {
        let (s, c) = e.angle.sin_cos();
        (0..n)
            .map(|i| {
                let t = std::f64::consts::TAU * i as f64 / n as f64;
                let (x, y) = (e.a * t.cos(), e.b * t.sin());
                Point2::new(e.cx + c * x - s * y, e.cy + s * x + c * y)
            })
            .collect()
    }

    #[test]
    fn kasa_recovers_an_exact_circle() {
        let pts: Vec<_> = (0..12)
            .map(|i| {
                let t = i as f64 * 0.5;
                Point2::new(40.0 + 7.5 * t.cos(), -3.0 + 7.5 * t.sin())
            })
            .collect();
        let (c, residual) = fit_circle_kasa(&pts).expect("circle");
        assert_relative_eq!(c.cx, 40.0, epsilon = 1e-9);
        assert_relative_eq!(c.cy, -3.0, epsilon = 1e-9);
        assert_relative_eq!(c.r, 7.5, epsilon = 1e-9);
        assert!(residual < 1e-9);
    }

    #[test]
    fn direct_fit_recovers_an_exact_ellipse() {
        let truth = Ellipse {
            cx: 103.7,
            cy: -42.2,
            a: 30.0,
            b: 12.0,
            angle: 0.6,
        };
        let fit = fit_ellipse_direct(&ellipse_points(&truth, 40)).expect("ellipse");
        assert!((fit.cx - truth.cx).abs() < 0.01, "cx {}", fit.cx);
        assert!((fit.cy - truth.cy).abs() < 0.01, "cy {}", fit.cy);
        assert_relative_eq!(fit.a, truth.a, epsilon = 1e-4);
        assert_relative_eq!(fit.b, truth.b, epsilon = 1e-4);
        assert_relative_eq!(fit.angle, truth.angle, epsilon = 1e-6);
    }

    #[test]
    fn direct_fit_needs_six_points() {
        let pts = ellipse_points(
            &Ellipse {
                cx: 0.0,
                cy: 0.0,
                a: 3.0,
                b: 2.0,
                angle: 0.0,
            },
            5,
        );
        assert!(fit_ellipse_direct(&pts).is_none());
    }

    #[test]
    fn sectors_keep_the_farthest_point() {
        let center = Point2::new(0.0, 0.0);
        let pts = [
            Point2::new(1.0, 0.1),
            Point2::new(3.0, 0.2),
            Point2::new(-2.0, 0.0),
            Point2::new(0.0, 0.0),
        ];
        let border = sample_border_by_sector(&pts, center, 4);
        assert_eq!(border.len(), 2);
        assert!(border.contains(&Point2::new(3.0, 0.2)));
        assert!(border.contains(&Point2::new(-2.0, 0.0)));
    }

    #[test]
    fn auto_mode_switches_to_the_ellipse() {
        let truth = Ellipse {
            cx: 10.0,
            cy: 20.0,
            a: 25.0,
            b: 10.0,
            angle: 0.3,
        };
        let pts = ellipse_points(&truth, 16);
        let c = fit_center(&pts, FitMode::Auto).expect("centre");
        assert_relative_eq!(c.x, 10.0, epsilon = 1e-6);
        assert_relative_eq!(c.y, 20.0, epsilon = 1e-6);
        assert!(fit_center(&pts[..2], FitMode::Circle).is_none());
    }
}
