//! RANSAC homography fitting over noisy correspondences.
//!
//! Each trial fits the 4-point DLT to a random minimal sample and counts the
//! points whose reprojection error falls under the threshold. The winning
//! inlier set is refit with the N-point least-squares estimator.

use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    estimate_homography_dlt, homography_from_4pt, reprojection_error, split_points, CancelToken,
    Correspondence, Homography, HomographyError,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Pairs closer than this (in both spaces) are ignored by
/// [`estimate_scale_ratio`].
const MIN_PAIR_DISTANCE: f64 = 20.0;
const MIN_SCALE_SAMPLES: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    pub max_iterations: usize,
    /// Inlier threshold in destination units.
    pub inlier_threshold: f64,
    /// Hard floor on the inlier count; never below 4.
    pub min_inliers: usize,
    /// Stop once this fraction of all points are inliers.
    pub early_stop_ratio: f64,
    /// RNG seed; `None` draws one from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            inlier_threshold: 1.0,
            min_inliers: 4,
            early_stop_ratio: 0.9,
            seed: Some(0),
        }
    }
}

impl RansacParams {
    /// Iteration budget scaled with the number of correspondences.
    pub fn adaptive_iterations(n: usize) -> usize {
        n.saturating_mul(80).clamp(1000, 10_000)
    }
}

#[derive(Clone, Debug)]
pub struct RansacResult {
    pub homography: Homography,
    /// Indices of the final inliers.
    pub inliers: Vec<usize>,
    pub inlier_mask: Vec<bool>,
    /// Reprojection error of every input point under `homography`.
    pub errors: Vec<f64>,
    /// Trials actually run.
    pub iterations: usize,
}

impl RansacResult {
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

struct Trial {
    h: Homography,
    count: usize,
}

fn count_inliers(h: &Homography, src: &[Point2<f64>], dst: &[Point2<f64>], thr: f64) -> usize {
    src.iter()
        .zip(dst)
        .filter(|(s, d)| reprojection_error(h, **s, **d) < thr)
        .count()
}

fn run_trials(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
    cancel: &CancelToken,
    rng: &mut StdRng,
    budget: usize,
) -> (Option<Trial>, usize) {
    let n = src.len();
    let mut best: Option<Trial> = None;
    let mut iterations = 0;

    for _ in 0..budget {
        if cancel.is_cancelled() {
            break;
        }
        iterations += 1;

        let idx = rand::seq::index::sample(rng, n, 4);
        let s = [0, 1, 2, 3].map(|k| src[idx.index(k)]);
        let d = [0, 1, 2, 3].map(|k| dst[idx.index(k)]);
        let Ok(h) = homography_from_4pt(&s, &d) else {
            continue;
        };

        let count = count_inliers(&h, src, dst, params.inlier_threshold);
        if best.as_ref().is_none_or(|b| count > b.count) {
            best = Some(Trial { h, count });
            if count as f64 > params.early_stop_ratio * n as f64 {
                break;
            }
        }
    }
    (best, iterations)
}

#[cfg(not(feature = "rayon"))]
fn search(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
    cancel: &CancelToken,
    seed: u64,
) -> (Option<Trial>, usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    run_trials(src, dst, params, cancel, &mut rng, params.max_iterations)
}

/// Splits the trial budget across the rayon pool, one seeded RNG per worker.
/// Ties go to the lowest worker index.
#[cfg(feature = "rayon")]
fn search(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
    cancel: &CancelToken,
    seed: u64,
) -> (Option<Trial>, usize) {
    use rayon::prelude::*;

    let workers = rayon::current_num_threads()
        .max(1)
        .min(params.max_iterations.max(1));
    let per_worker = params.max_iterations.div_ceil(workers);

    let results: Vec<(Option<Trial>, usize)> = (0..workers)
        .into_par_iter()
        .map(|w| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(w as u64));
            run_trials(src, dst, params, cancel, &mut rng, per_worker)
        })
        .collect();

    let mut best: Option<Trial> = None;
    let mut iterations = 0;
    for (trial, its) in results {
        iterations += its;
        if let Some(t) = trial {
            if best.as_ref().is_none_or(|b| t.count > b.count) {
                best = Some(t);
            }
        }
    }
    (best, iterations)
}

/// Robustly fit `dst ~ H · src`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, dst, params, cancel), fields(points = src.len()))
)]
pub fn ransac_homography(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
    cancel: &CancelToken,
) -> Result<RansacResult, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::InsufficientCorrespondences { needed: 4, got: n });
    }
    let min_inliers = params.min_inliers.max(4);

    let seed = params.seed.unwrap_or_else(|| rand::rng().random());
    let (best, iterations) = search(src, dst, params, cancel, seed);

    let Some(best) = best else {
        if cancel.is_cancelled() {
            return Err(HomographyError::Cancelled);
        }
        return Err(HomographyError::InsufficientInliers {
            needed: min_inliers,
            found: 0,
        });
    };
    log::debug!(
        "ransac: best trial {}/{} inliers after {} iterations",
        best.count,
        n,
        iterations
    );
    if best.count < min_inliers {
        return Err(HomographyError::InsufficientInliers {
            needed: min_inliers,
            found: best.count,
        });
    }

    // Refit over every inlier of the winning trial.
    let thr = params.inlier_threshold;
    let (in_src, in_dst): (Vec<_>, Vec<_>) = src
        .iter()
        .zip(dst)
        .filter(|(s, d)| reprojection_error(&best.h, **s, **d) < thr)
        .map(|(s, d)| (*s, *d))
        .unzip();

    let homography = match estimate_homography_dlt(&in_src, &in_dst) {
        Ok(refit) if count_inliers(&refit, src, dst, thr) >= best.count => refit,
        Ok(_) => best.h,
        Err(err) => {
            log::debug!("ransac refit failed ({err}), keeping the best minimal model");
            best.h
        }
    };

    let errors: Vec<f64> = src
        .iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(&homography, *s, *d))
        .collect();
    let inlier_mask: Vec<bool> = errors.iter().map(|&e| e < thr).collect();
    let inliers = inlier_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect();

    Ok(RansacResult {
        homography,
        inliers,
        inlier_mask,
        errors,
        iterations,
    })
}

/// [`ransac_homography`] over pixel → real correspondences.
pub fn ransac_correspondences(
    corrs: &[Correspondence],
    params: &RansacParams,
    cancel: &CancelToken,
) -> Result<RansacResult, HomographyError> {
    let (pixels, reals) = split_points(corrs);
    ransac_homography(&pixels, &reals, params, cancel)
}

/// Median ratio `|src_i - src_j| / |dst_i - dst_j|` over well-separated pairs.
///
/// For pixel → millimetre correspondences this is the pixels-per-mm scale.
/// `None` when fewer than ten usable pairs exist.
pub fn estimate_scale_ratio(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<f64> {
    let n = src.len().min(dst.len());
    let mut ratios = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let ds = (src[j] - src[i]).norm();
            let dd = (dst[j] - dst[i]).norm();
            if !ds.is_finite() || !dd.is_finite() {
                continue;
            }
            if ds < MIN_PAIR_DISTANCE || dd < MIN_PAIR_DISTANCE {
                continue;
            }
            ratios.push(ds / dd);
        }
    }
    if ratios.len() < MIN_SCALE_SAMPLES {
        return None;
    }
    ratios.sort_by(f64::total_cmp);
    Some(ratios[ratios.len() / 2])
}

/// Inlier threshold in millimetres: at least `base_mm`, and at least four
/// pixels' worth of millimetres when the scale can be estimated.
pub fn adaptive_inlier_threshold(base_mm: f64, pixels: &[Point2<f64>], reals: &[Point2<f64>]) -> f64 {
    match estimate_scale_ratio(pixels, reals) {
        Some(px_per_mm) if px_per_mm > 0.0 => base_mm.max(4.0 / px_per_mm),
        _ => base_mm,
    }
}

/// Inlier count below which a fit is considered weak.
pub fn recommended_min_inliers(n: usize) -> usize {
    if n < 30 {
        6.max(n / 2)
    } else {
        12.max(n * 7 / 10)
    }
}
