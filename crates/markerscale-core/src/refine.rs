//! Levenberg–Marquardt refinement of a homography.
//!
//! The eight free entries of `H` (with `h22 = 1`) are optimised to minimise
//! the (optionally weighted) summed squared reprojection error. The
//! optimisation runs on
//! Hartley-normalized coordinates; the cost there is a constant multiple of
//! the cost in destination units, so accepted steps never increase the
//! reported error.

use nalgebra::{Point2, SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::homography::{normalize_homography, normalize_points};
use crate::linalg::solve_gaussian;
use crate::{reprojection_error, CancelToken, Homography};

#[cfg(feature = "tracing")]
use tracing::instrument;

type Mat8 = SMatrix<f64, 8, 8>;
type Vec8 = SVector<f64, 8>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmParams {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    /// Give up once the damping grows past this value.
    pub max_lambda: f64,
    /// Stop when an accepted step improves the cost by less than this
    /// relative amount.
    pub tolerance: f64,
}

impl Default for LmParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            initial_lambda: 1e-3,
            max_lambda: 1e10,
            tolerance: 1e-12,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LmResult {
    pub homography: Homography,
    /// Weighted RMS reprojection error after refinement, in destination
    /// units. Plain RMS for [`refine_homography_lm`].
    pub rms_error: f64,
    /// Weighted RMS reprojection error of the initial homography.
    pub initial_rms_error: f64,
    pub iterations: usize,
    pub converged: bool,
}

fn project(p: &Vec8, x: f64, y: f64) -> Option<(f64, f64, f64)> {
    let w = p[6] * x + p[7] * y + 1.0;
    if w.abs() < 1e-12 {
        return None;
    }
    let u = (p[0] * x + p[1] * y + p[2]) / w;
    let v = (p[3] * x + p[4] * y + p[5]) / w;
    Some((u, v, w))
}

fn cost(p: &Vec8, src: &[Point2<f64>], dst: &[Point2<f64>], weights: &[f64]) -> f64 {
    src.iter()
        .zip(dst)
        .zip(weights)
        .map(|((s, d), w)| match project(p, s.x, s.y) {
            Some((u, v, _)) => w * ((u - d.x).powi(2) + (v - d.y).powi(2)),
            None => f64::INFINITY,
        })
        .sum()
}

/// `sqrt(Σ wᵢ·eᵢ² / Σ wᵢ)`; 0 when the weights sum to zero.
pub fn weighted_rms_error(
    h: &Homography,
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    weights: &[f64],
) -> f64 {
    let (sum, total) = src
        .iter()
        .zip(dst)
        .zip(weights)
        .fold((0.0, 0.0), |(sum, total), ((s, d), w)| {
            (sum + w * reprojection_error(h, *s, *d).powi(2), total + w)
        });
    if total <= 0.0 {
        return 0.0;
    }
    (sum / total).sqrt()
}

/// Accumulate `JᵀJ` and `Jᵀr` with closed-form partials of the projective
/// division.
fn normal_equations(
    p: &Vec8,
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    weights: &[f64],
) -> (Mat8, Vec8) {
    let mut jtj = Mat8::zeros();
    let mut jtr = Vec8::zeros();
    for ((s, d), &wt) in src.iter().zip(dst).zip(weights) {
        let Some((u, v, w)) = project(p, s.x, s.y) else {
            continue;
        };
        let (x, y) = (s.x, s.y);
        let jx = Vec8::from_column_slice(&[
            x / w,
            y / w,
            1.0 / w,
            0.0,
            0.0,
            0.0,
            -u * x / w,
            -u * y / w,
        ]);
        let jy = Vec8::from_column_slice(&[
            0.0,
            0.0,
            0.0,
            x / w,
            y / w,
            1.0 / w,
            -v * x / w,
            -v * y / w,
        ]);
        let rx = u - d.x;
        let ry = v - d.y;
        jtj += (jx * jx.transpose() + jy * jy.transpose()) * wt;
        jtr += (jx * rx + jy * ry) * wt;
    }
    (jtj, jtr)
}

/// Refine `initial` so that `dst ~ H · src` with minimal squared error.
///
/// The returned error never exceeds the error of `initial`.
pub fn refine_homography_lm(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    initial: &Homography,
    params: &LmParams,
    cancel: &CancelToken,
) -> LmResult {
    let weights = vec![1.0; src.len()];
    refine_homography_lm_weighted(src, dst, &weights, initial, params, cancel)
}

/// [`refine_homography_lm`] with a non-negative weight per correspondence.
///
/// The returned weighted error never exceeds the weighted error of
/// `initial`. Mismatched lengths or non-finite weights leave `initial`
/// unchanged.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, dst, weights, initial, params, cancel), fields(points = src.len()))
)]
pub fn refine_homography_lm_weighted(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    weights: &[f64],
    initial: &Homography,
    params: &LmParams,
    cancel: &CancelToken,
) -> LmResult {
    let initial_rms_error = weighted_rms_error(initial, src, dst, weights);
    let unchanged = |iterations: usize| LmResult {
        homography: *initial,
        rms_error: initial_rms_error,
        initial_rms_error,
        iterations,
        converged: false,
    };
    let bad_weights = weights.len() != src.len()
        || weights.iter().any(|w| !w.is_finite() || *w < 0.0)
        || weights.iter().filter(|w| **w > 0.0).count() < 4;
    if src.len() != dst.len() || src.len() < 4 || bad_weights || !initial_rms_error.is_finite() {
        return unchanged(0);
    }

    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);
    let Some(t_src_inv) = t_src.try_inverse() else {
        return unchanged(0);
    };
    let Some(hn) = normalize_homography(t_dst * initial.h * t_src_inv) else {
        return unchanged(0);
    };

    let mut p = Vec8::from_column_slice(&Homography::new(hn).params());
    let mut current = cost(&p, &src_n, &dst_n, weights);
    let mut lambda = params.initial_lambda;
    let mut converged = false;
    let mut iterations = 0;
    let mut accepted = 0;

    while iterations < params.max_iterations {
        if cancel.is_cancelled() {
            log::debug!("lm: cancelled after {iterations} iterations");
            break;
        }
        iterations += 1;

        let (jtj, jtr) = normal_equations(&p, &src_n, &dst_n, weights);
        let mut step_taken = false;
        while lambda <= params.max_lambda {
            let mut a = jtj;
            for i in 0..8 {
                let d = jtj[(i, i)];
                a[(i, i)] += lambda * if d > 0.0 { d } else { 1.0 };
            }
            let Some(delta) = solve_gaussian(a, -jtr) else {
                lambda *= 10.0;
                continue;
            };
            let candidate = p + delta;
            let next = cost(&candidate, &src_n, &dst_n, weights);
            if next < current {
                let improvement = current - next;
                p = candidate;
                let previous = current;
                current = next;
                lambda *= 0.1;
                step_taken = true;
                accepted += 1;
                if improvement <= params.tolerance * previous.max(f64::MIN_POSITIVE) {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if !step_taken {
            // No damping level reduces the cost: at a minimum.
            converged = true;
            break;
        }
        if converged || current <= f64::MIN_POSITIVE {
            converged = true;
            break;
        }
    }

    if accepted == 0 {
        return LmResult {
            converged,
            ..unchanged(iterations)
        };
    }

    let hn = Homography::from_params(&[p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]]);
    let refined = t_dst
        .try_inverse()
        .map(|t_dst_inv| t_dst_inv * hn.h * t_src)
        .and_then(normalize_homography)
        .map(Homography::new);

    match refined {
        Some(h) => {
            let rms_error = weighted_rms_error(&h, src, dst, weights);
            if rms_error <= initial_rms_error {
                log::debug!(
                    "lm: rms {:.6} -> {:.6} in {} iterations",
                    initial_rms_error,
                    rms_error,
                    iterations
                );
                LmResult {
                    homography: h,
                    rms_error,
                    initial_rms_error,
                    iterations,
                    converged,
                }
            } else {
                unchanged(iterations)
            }
        }
        None => unchanged(iterations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate_homography_dlt;
    use nalgebra::Matrix3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gt() -> Homography {
        Homography::new(Matrix3::new(
            0.19, 0.015, -25.0, //
            -0.01, 0.2, -18.0, //
            0.00012, 0.00004, 1.0,
        ))
    }

    fn noisy_scene(seed: u64, sigma_px: f64) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let h = gt();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                let p = Point2::new(140.0 + 95.0 * x as f64, 110.0 + 92.0 * y as f64);
                dst.push(h.apply(p));
                src.push(Point2::new(
                    p.x + rng.random_range(-sigma_px..=sigma_px),
                    p.y + rng.random_range(-sigma_px..=sigma_px),
                ));
            }
        }
        (src, dst)
    }

    #[test]
    fn refinement_never_increases_error() {
        for seed in 0..5 {
            let (src, dst) = noisy_scene(seed, 1.5);
            let init = estimate_homography_dlt(&src, &dst).expect("dlt");
            let res = refine_homography_lm(&src, &dst, &init, &LmParams::default(), &CancelToken::new());
            assert!(
                res.rms_error <= res.initial_rms_error,
                "seed {seed}: {} > {}",
                res.rms_error,
                res.initial_rms_error
            );
        }
    }

    #[test]
    fn recovers_from_a_perturbed_start() {
        let (src, dst) = noisy_scene(7, 0.0);
        let mut p = gt().params();
        p[2] += 1.5;
        p[4] *= 1.01;
        p[6] += 2e-5;
        let start = Homography::from_params(&p);
        let res = refine_homography_lm(&src, &dst, &start, &LmParams::default(), &CancelToken::new());
        assert!(res.initial_rms_error > 0.5);
        assert!(res.rms_error < 1e-6, "rms {}", res.rms_error);
    }

    #[test]
    fn cancelled_refinement_returns_the_start() {
        let (src, dst) = noisy_scene(3, 1.0);
        let init = estimate_homography_dlt(&src, &dst).expect("dlt");
        let token = CancelToken::new();
        token.cancel();
        let res = refine_homography_lm(&src, &dst, &init, &LmParams::default(), &token);
        assert_eq!(res.iterations, 0);
        assert_eq!(res.homography, init);
    }

    #[test]
    fn zero_weight_points_do_not_pull_the_fit() {
        let (src, mut dst) = noisy_scene(11, 0.0);
        let mut weights = vec![1.0; src.len()];
        for i in [0usize, 9, 27, 63] {
            dst[i].x += 4.0;
            weights[i] = 0.0;
        }
        let mut p = gt().params();
        p[2] += 0.8;
        let start = Homography::from_params(&p);

        let res = refine_homography_lm_weighted(
            &src,
            &dst,
            &weights,
            &start,
            &LmParams::default(),
            &CancelToken::new(),
        );
        assert!(res.rms_error < 1e-6, "weighted rms {}", res.rms_error);
        let at = Point2::new(400.0, 300.0);
        assert!((res.homography.apply(at) - gt().apply(at)).norm() < 1e-6);

        let plain = refine_homography_lm(&src, &dst, &start, &LmParams::default(), &CancelToken::new());
        assert!(plain.rms_error > 0.1);
    }

    #[test]
    fn weighted_rms_matches_plain_rms_for_unit_weights() {
        let (src, dst) = noisy_scene(5, 1.0);
        let h = gt();
        let w = vec![1.0; src.len()];
        let plain = crate::rms_reprojection_error(&h, &src, &dst);
        assert!((weighted_rms_error(&h, &src, &dst, &w) - plain).abs() < 1e-12);
        assert_eq!(weighted_rms_error(&h, &src, &dst, &vec![0.0; src.len()]), 0.0);
    }

    #[test]
    fn mismatched_weights_leave_the_start() {
        let (src, dst) = noisy_scene(2, 0.5);
        let init = estimate_homography_dlt(&src, &dst).expect("dlt");
        let res = refine_homography_lm_weighted(
            &src,
            &dst,
            &[1.0; 3],
            &init,
            &LmParams::default(),
            &CancelToken::new(),
        );
        assert_eq!(res.homography, init);
        assert_eq!(res.iterations, 0);
    }
}
