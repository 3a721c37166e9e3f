//! High-precision homography from many marker correspondences.
//!
//! Starting from four corners, the pipeline collects up to
//! `4 + 16 + 49 + 36` pixel ↔ millimetre correspondences from the printed
//! structure of the marker:
//!
//! 1. the corners themselves, optionally re-fitted on the magenta fiducials,
//! 2. four band transitions on a scan line along each side,
//! 3. the 7×7 corners of the pattern grid, Harris-refined at saddle points,
//! 4. the 6×6 pattern cell centres, classified dark or light.
//!
//! Only measured correspondences (`sub_pixel_refined`) enter the fit:
//! fiducial corners, detected transitions and Harris-refined saddles. The
//! rest are predictions of the current frame and are reported with their
//! final error but never constrain it. RANSAC removes outliers and refits
//! on the inliers, then a confidence-weighted Levenberg–Marquardt polishes
//! the result. The fitted homography moves the frame and the structure is
//! measured again until the corners settle. The final RMS error of the
//! inliers in millimetres becomes the quality `exp(−10 · rms)`.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use markerscale_core::{
    adaptive_inlier_threshold, distance, estimate_tilt, ransac_homography,
    recommended_min_inliers, refine_homography_lm_weighted, reprojection_error,
    rms_reprojection_error, sample_luminosity, CancelToken, Correspondence, CorrespondenceKind,
    Homography, LmParams, MarkerSpec, Quad, RansacParams, RgbaImageView, Tilt,
};
use markerscale_detect::{
    cluster_pixels, find_subpixel_transition, refine_corner, refine_harris, ColorClassifier,
    ColorPixel, CornerType, DetectionThresholds, MagentaClassifier, MarkerFrame,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Passes stop once no corner moves further than this, in pixels.
const SETTLED_SHIFT_PX: f64 = 0.02;

/// Knobs of [`UltraPrecisionPipeline`] that are not detector thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionParams {
    /// RANSAC inlier threshold floor in millimetres; raised to four pixels'
    /// worth when the scale is known.
    pub base_inlier_threshold_mm: f64,
    pub ransac_seed: Option<u64>,
    pub lm: LmParams,
    /// Levenberg–Marquardt only runs with at least this many inliers.
    pub min_lm_inliers: usize,
    /// Fewer measured correspondences than this fail the fit.
    pub min_measured_points: usize,
    /// Measure-and-fit passes, each starting from the previous fit.
    pub max_passes: usize,
    /// Re-fit the corners on the magenta fiducials when they are printed.
    pub refit_fiducials: bool,
    /// Largest accepted corner move from a fiducial re-fit, in pixels.
    pub max_fiducial_shift_px: f64,
    /// Minimum light/dark difference for a grid point to count as a saddle.
    pub min_junction_contrast: f64,
}

impl Default for PrecisionParams {
    fn default() -> Self {
        Self {
            base_inlier_threshold_mm: 1.0,
            ransac_seed: Some(0),
            lm: LmParams::default(),
            min_lm_inliers: 6,
            min_measured_points: 8,
            max_passes: 4,
            refit_fiducials: true,
            max_fiducial_shift_px: 3.0,
            min_junction_contrast: 30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UltraPrecisionResult {
    /// Every correspondence of the last pass, with its final reprojection
    /// error. Only the `sub_pixel_refined` ones were fitted.
    pub correspondences: Vec<Correspondence>,
    /// Inliers among the fitted correspondences.
    pub inlier_count: usize,
    pub outlier_count: usize,
    /// Pixel → millimetre map; identity when the fit failed.
    pub homography: Homography,
    /// RMS reprojection error of the inliers in millimetres.
    pub reprojection_error_mm: f64,
    /// `exp(−10 · reprojection_error_mm)`, 0 on failure.
    pub quality: f64,
    /// Inlier fraction of the fitted correspondences.
    pub confidence: f64,
    pub tilt: Tilt,
    /// RANSAC trials run in the last pass.
    pub iterations: usize,
    /// Measure-and-fit passes run.
    pub passes: usize,
    /// Marker corners `[TL, TR, BR, BL]` under the fitted homography, or the
    /// corners the last pass started from when the fit failed.
    pub corners: [Point2<f64>; 4],
    /// Dark/light state of the pattern cells, row-major.
    pub grid_pattern: Vec<bool>,
}

impl UltraPrecisionResult {
    pub fn is_valid(&self) -> bool {
        self.quality > 0.0
    }
}

pub struct UltraPrecisionPipeline {
    spec: MarkerSpec,
    thresholds: DetectionThresholds,
    params: PrecisionParams,
}

impl UltraPrecisionPipeline {
    pub fn new(spec: MarkerSpec, thresholds: DetectionThresholds, params: PrecisionParams) -> Self {
        Self {
            spec,
            thresholds,
            params,
        }
    }

    pub fn with_defaults(spec: MarkerSpec) -> Self {
        Self::new(spec, DetectionThresholds::default(), PrecisionParams::default())
    }

    pub fn spec(&self) -> &MarkerSpec {
        &self.spec
    }

    pub fn run(&self, img: &RgbaImageView<'_>, corners: [Point2<f64>; 4]) -> UltraPrecisionResult {
        self.run_with_cancel(img, corners, &CancelToken::new())
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img, corners, cancel), fields(w = img.width(), h = img.height()))
    )]
    pub fn run_with_cancel(
        &self,
        img: &RgbaImageView<'_>,
        corners: [Point2<f64>; 4],
        cancel: &CancelToken,
    ) -> UltraPrecisionResult {
        let (corners, refitted) = if self.params.refit_fiducials {
            self.refit_fiducial_corners(img, corners)
        } else {
            (corners, [false; 4])
        };

        let mut frame_corners = corners;
        let mut last: Option<UltraPrecisionResult> = None;
        for pass in 1..=self.params.max_passes.max(1) {
            let Some(frame) = MarkerFrame::from_quad(&Quad::from_ordered(frame_corners)) else {
                log::warn!("precision: degenerate corners in pass {pass}");
                break;
            };
            let (corrs, grid_pattern) = self.measure(img, &frame, corners, refitted);
            let mut result = self.solve(corrs, frame_corners, grid_pattern, cancel);
            result.passes = pass;
            if !result.is_valid() {
                // A failed later pass keeps the previous fit.
                if last.is_none() {
                    last = Some(result);
                }
                break;
            }
            let shift = result
                .corners
                .iter()
                .zip(&frame_corners)
                .map(|(a, b)| distance(*a, *b))
                .fold(0.0_f64, f64::max);
            log::debug!("precision: pass {pass} moved the corners by {shift:.3} px");
            frame_corners = result.corners;
            last = Some(result);
            if shift < SETTLED_SHIFT_PX || cancel.is_cancelled() {
                break;
            }
        }
        last.unwrap_or_else(|| failed(Vec::new(), corners, Vec::new()))
    }

    /// Correspondences of one pass over `frame`. `corners` are the input
    /// corners; those flagged in `refitted` count as measured.
    fn measure(
        &self,
        img: &RgbaImageView<'_>,
        frame: &MarkerFrame,
        corners: [Point2<f64>; 4],
        refitted: [bool; 4],
    ) -> (Vec<Correspondence>, Vec<bool>) {
        let mut corrs: Vec<Correspondence> = corners
            .iter()
            .zip(self.spec.real_corners())
            .zip(refitted)
            .map(|((p, r), measured)| {
                let confidence = if measured { 1.0 } else { 0.5 };
                Correspondence::new(*p, r, confidence, CorrespondenceKind::Corner, measured)
            })
            .collect();
        corrs.extend(self.edge_transitions(img, frame));
        corrs.extend(self.grid_corners(img, frame));
        let (centers, grid_pattern) = self.grid_centers(img, frame);
        corrs.extend(centers);
        log::debug!("precision: {} correspondences", corrs.len());
        (corrs, grid_pattern)
    }

    /// Move each corner to the border-line intersection found from its
    /// fiducial, when a fiducial is visible near the expected spot.
    fn refit_fiducial_corners(
        &self,
        img: &RgbaImageView<'_>,
        corners: [Point2<f64>; 4],
    ) -> ([Point2<f64>; 4], [bool; 4]) {
        let Some(frame) = MarkerFrame::from_quad(&Quad::from_ordered(corners)) else {
            return (corners, [false; 4]);
        };
        let classifier = MagentaClassifier::from_thresholds(&self.thresholds.color);
        let radius = 0.5 * frame.scale(self.spec.outer_band_frac);
        let mut out = corners;
        let mut moved = [false; 4];
        for (k, (predicted, corner_type)) in frame
            .fiducial_points(&self.spec)
            .into_iter()
            .zip(CornerType::ALL)
            .enumerate()
        {
            let pixels = classify_window(img, predicted, radius, &classifier);
            let clusters = cluster_pixels(img, &pixels, &self.thresholds.color);
            let Some(dot) = clusters.first() else {
                continue;
            };
            let r = refine_corner(img, dot.center, corner_type, dot.size(), &self.thresholds.corner);
            let shift = (r.point - corners[k]).norm();
            if r.refined && shift <= self.params.max_fiducial_shift_px {
                out[k] = r.point;
                moved[k] = true;
            }
        }
        log::debug!(
            "precision: {} corners re-fitted on fiducials",
            moved.iter().filter(|m| **m).count()
        );
        (out, moved)
    }

    /// Band transitions on a scan line along each side.
    fn edge_transitions(&self, img: &RgbaImageView<'_>, frame: &MarkerFrame) -> Vec<Correspondence> {
        let d = self.spec.transition_scan_depth();
        let half = 0.5 * self.spec.outer_band_frac.min(self.spec.inner_band_frac);
        let min_gradient = self.thresholds.transition.min_gradient.max(f64::EPSILON);
        let mut out = Vec::new();
        for side in 0..4 {
            for r in self.spec.transition_ratios() {
                let (ua, va) = scan_uv(side, d, r - half);
                let (ub, vb) = scan_uv(side, d, r + half);
                let Some(t) = find_subpixel_transition(
                    img,
                    frame.point(ua, va),
                    frame.point(ub, vb),
                    0.5,
                    &self.thresholds.transition,
                ) else {
                    continue;
                };
                let (u, v) = scan_uv(side, d, r);
                let confidence = (t.strength.abs() / (4.0 * min_gradient)).min(1.0);
                out.push(Correspondence::new(
                    t.point,
                    self.spec.real_point(u, v),
                    confidence,
                    CorrespondenceKind::EdgeTransition,
                    true,
                ));
            }
        }
        log::debug!("precision: {} edge transitions", out.len());
        out
    }

    /// Pattern grid corners; saddle points are Harris-refined, the rest are
    /// frame predictions.
    fn grid_corners(&self, img: &RgbaImageView<'_>, frame: &MarkerFrame) -> Vec<Correspondence> {
        let n = self.spec.grid_cells as usize;
        let p0 = self.spec.pattern_region[0];
        let cell = self.spec.cell_frac();
        let mut out = Vec::with_capacity((n + 1) * (n + 1));
        let mut refined = 0;
        for j in 0..=n {
            for i in 0..=n {
                let (u, v) = (p0 + i as f64 * cell, p0 + j as f64 * cell);
                let predicted = frame.point(u, v);
                let real = self.spec.real_point(u, v);
                let harris = is_saddle(img, frame, u, v, 0.25 * cell, self.params.min_junction_contrast)
                    .then(|| refine_harris(img, predicted, &self.thresholds.harris))
                    .flatten();
                let corr = match harris {
                    Some(h) => {
                        refined += 1;
                        Correspondence::new(h.point, real, 0.9, CorrespondenceKind::GridCorner, true)
                    }
                    None => {
                        Correspondence::new(predicted, real, 0.5, CorrespondenceKind::GridCorner, false)
                    }
                };
                out.push(corr);
            }
        }
        log::debug!("precision: {refined}/{} grid corners refined", out.len());
        out
    }

    /// Pattern cell centres, classified against the mean of all cells.
    fn grid_centers(
        &self,
        img: &RgbaImageView<'_>,
        frame: &MarkerFrame,
    ) -> (Vec<Correspondence>, Vec<bool>) {
        let n = self.spec.grid_cells as usize;
        let p0 = self.spec.pattern_region[0];
        let cell = self.spec.cell_frac();
        let q = 0.25 * cell;
        let mut samples = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                let u = p0 + (col as f64 + 0.5) * cell;
                let v = p0 + (row as f64 + 0.5) * cell;
                let lum = [(0.0, 0.0), (-q, -q), (q, -q), (q, q), (-q, q)]
                    .iter()
                    .map(|(du, dv)| {
                        let p = frame.point(u + du, v + dv);
                        sample_luminosity(img, p.x, p.y)
                    })
                    .sum::<f64>()
                    / 5.0;
                samples.push((u, v, lum));
            }
        }
        if samples.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let mean = samples.iter().map(|s| s.2).sum::<f64>() / samples.len() as f64;
        let spread = samples
            .iter()
            .map(|s| (s.2 - mean).abs())
            .fold(0.0_f64, f64::max);
        let mut pattern = Vec::with_capacity(samples.len());
        let corrs = samples
            .into_iter()
            .map(|(u, v, lum)| {
                pattern.push(lum < mean);
                let confidence = if spread > f64::EPSILON {
                    (lum - mean).abs() / spread
                } else {
                    0.0
                };
                Correspondence::new(
                    frame.point(u, v),
                    self.spec.real_point(u, v),
                    confidence,
                    CorrespondenceKind::GridCenter,
                    false,
                )
            })
            .collect();
        (corrs, pattern)
    }

    /// Fit the measured correspondences of `corrs`; `corners` are reported
    /// when the fit fails.
    fn solve(
        &self,
        mut corrs: Vec<Correspondence>,
        corners: [Point2<f64>; 4],
        grid_pattern: Vec<bool>,
        cancel: &CancelToken,
    ) -> UltraPrecisionResult {
        let fitted: Vec<usize> = (0..corrs.len())
            .filter(|&i| corrs[i].sub_pixel_refined)
            .collect();
        let n = fitted.len();
        if n < self.params.min_measured_points.max(4) {
            log::warn!(
                "precision: only {n} measured correspondences of {}",
                corrs.len()
            );
            return failed(corrs, corners, grid_pattern);
        }
        let pixels: Vec<Point2<f64>> = fitted.iter().map(|&i| corrs[i].pixel).collect();
        let reals: Vec<Point2<f64>> = fitted.iter().map(|&i| corrs[i].real).collect();
        let params = RansacParams {
            max_iterations: RansacParams::adaptive_iterations(n),
            inlier_threshold: adaptive_inlier_threshold(
                self.params.base_inlier_threshold_mm,
                &pixels,
                &reals,
            ),
            seed: self.params.ransac_seed,
            ..RansacParams::default()
        };
        let ransac = match ransac_homography(&pixels, &reals, &params, cancel) {
            Ok(r) => r,
            Err(err) => {
                log::warn!("precision: ransac failed: {err}");
                return failed(corrs, corners, grid_pattern);
            }
        };
        let inliers = ransac.inlier_count();
        let recommended = recommended_min_inliers(n);
        if inliers < recommended {
            log::warn!("precision: {inliers}/{n} inliers, below the recommended {recommended}");
        }

        let in_px: Vec<Point2<f64>> = ransac.inliers.iter().map(|&i| pixels[i]).collect();
        let in_real: Vec<Point2<f64>> = ransac.inliers.iter().map(|&i| reals[i]).collect();
        let homography = if inliers >= self.params.min_lm_inliers {
            let weights: Vec<f64> = ransac
                .inliers
                .iter()
                .map(|&i| corrs[fitted[i]].confidence)
                .collect();
            let lm = refine_homography_lm_weighted(
                &in_px,
                &in_real,
                &weights,
                &ransac.homography,
                &self.params.lm,
                cancel,
            );
            log::debug!(
                "precision: lm weighted rms {:.4} -> {:.4} mm in {} iterations",
                lm.initial_rms_error,
                lm.rms_error,
                lm.iterations
            );
            lm.homography
        } else {
            ransac.homography
        };
        let rms = rms_reprojection_error(&homography, &in_px, &in_real);

        let Some(fitted_corners) = homography
            .inverse()
            .and_then(|inv| {
                let [a, b, c, d] = self.spec.real_corners().map(|r| inv.try_apply(r));
                Some([a?, b?, c?, d?])
            })
        else {
            log::warn!("precision: fitted homography is not invertible");
            return failed(corrs, corners, grid_pattern);
        };

        for c in &mut corrs {
            c.reprojection_error = Some(reprojection_error(&homography, c.pixel, c.real));
        }
        let quality = (-10.0 * rms).exp();
        log::info!(
            "precision: {inliers}/{n} inliers of {} correspondences, rms {rms:.4} mm, quality {quality:.3}",
            corrs.len()
        );
        UltraPrecisionResult {
            correspondences: corrs,
            inlier_count: inliers,
            outlier_count: n - inliers,
            homography,
            reprojection_error_mm: rms,
            quality,
            confidence: inliers as f64 / n as f64,
            tilt: estimate_tilt(&Quad::from_ordered(fitted_corners)),
            iterations: ransac.iterations,
            passes: 1,
            corners: fitted_corners,
            grid_pattern,
        }
    }
}

fn failed(
    correspondences: Vec<Correspondence>,
    corners: [Point2<f64>; 4],
    grid_pattern: Vec<bool>,
) -> UltraPrecisionResult {
    UltraPrecisionResult {
        outlier_count: correspondences.iter().filter(|c| c.sub_pixel_refined).count(),
        correspondences,
        inlier_count: 0,
        homography: Homography::identity(),
        reprojection_error_mm: f64::INFINITY,
        quality: 0.0,
        confidence: 0.0,
        tilt: estimate_tilt(&Quad::from_ordered(corners)),
        iterations: 0,
        passes: 1,
        corners,
        grid_pattern,
    }
}

/// Marker-plane point at position `t` along the scan line of `side`, which
/// runs parallel to that side at depth `d`.
fn scan_uv(side: usize, d: f64, t: f64) -> (f64, f64) {
    match side {
        0 => (t, d),
        1 => (1.0 - d, t),
        2 => (t, 1.0 - d),
        _ => (d, t),
    }
}

/// Diagonal quadrants around `(u, v)` alike, adjacent ones different.
fn is_saddle(
    img: &RgbaImageView<'_>,
    frame: &MarkerFrame,
    u: f64,
    v: f64,
    q: f64,
    min_contrast: f64,
) -> bool {
    let lum = |du: f64, dv: f64| {
        let p = frame.point(u + du, v + dv);
        sample_luminosity(img, p.x, p.y)
    };
    let [a, b, c, d] = [lum(-q, -q), lum(q, -q), lum(q, q), lum(-q, q)];
    let contrast = 0.5 * ((a + c) - (b + d)).abs();
    contrast >= min_contrast && (a - c).abs() < 0.5 * contrast && (b - d).abs() < 0.5 * contrast
}

fn classify_window<C: ColorClassifier>(
    img: &RgbaImageView<'_>,
    center: Point2<f64>,
    radius: f64,
    classifier: &C,
) -> Vec<ColorPixel> {
    let x0 = (center.x - radius).floor().max(0.0) as usize;
    let y0 = (center.y - radius).floor().max(0.0) as usize;
    let x1 = ((center.x + radius).ceil().max(0.0) as usize).min(img.width().saturating_sub(1));
    let y1 = ((center.y + radius).ceil().max(0.0) as usize).min(img.height().saturating_sub(1));
    let mut out = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            let [r, g, b, _] = img.rgba(x, y);
            if let Some(score) = classifier.classify(r, g, b) {
                out.push(ColorPixel { x, y, score });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerscale_core::RgbaImage;

    fn pipeline() -> UltraPrecisionPipeline {
        UltraPrecisionPipeline::with_defaults(MarkerSpec::square(168.0))
    }

    fn px_to_mm() -> Homography {
        Homography::from_array([[0.25, 0.01, -20.0], [-0.012, 0.26, -15.0], [1e-5, 2e-5, 1.0]])
    }

    /// An 8×8 lattice of exact correspondences under [`px_to_mm`].
    fn lattice(measured: bool) -> Vec<Correspondence> {
        let h = px_to_mm();
        (0..8)
            .flat_map(|j| (0..8).map(move |i| Point2::new(100.0 + 60.0 * i as f64, 80.0 + 55.0 * j as f64)))
            .map(|p| Correspondence::new(p, h.apply(p), 0.9, CorrespondenceKind::GridCorner, measured))
            .collect()
    }

    fn square_corners() -> [Point2<f64>; 4] {
        [
            Point2::new(20.0, 20.0),
            Point2::new(180.0, 20.0),
            Point2::new(180.0, 180.0),
            Point2::new(20.0, 180.0),
        ]
    }

    #[test]
    fn scan_lines_run_parallel_to_their_side() {
        assert_eq!(scan_uv(0, 0.4, 0.2), (0.2, 0.4));
        assert_eq!(scan_uv(1, 0.4, 0.2), (0.6, 0.2));
        assert_eq!(scan_uv(2, 0.4, 0.2), (0.2, 0.6));
        assert_eq!(scan_uv(3, 0.4, 0.2), (0.4, 0.2));
    }

    #[test]
    fn too_few_correspondences_give_identity() {
        let corrs: Vec<Correspondence> = (0..3)
            .map(|i| {
                let p = Point2::new(i as f64 * 10.0, 5.0);
                Correspondence::new(p, p, 1.0, CorrespondenceKind::Corner, true)
            })
            .collect();
        let r = pipeline().solve(corrs, square_corners(), Vec::new(), &CancelToken::new());
        assert_eq!(r.homography, Homography::identity());
        assert_eq!(r.quality, 0.0);
        assert_eq!(r.inlier_count, 0);
        assert_eq!(r.corners, square_corners());
        assert!(!r.is_valid());
    }

    #[test]
    fn exact_correspondences_with_an_outlier() {
        let mut corrs = lattice(true);
        corrs[10].real.x += 25.0;
        let r = pipeline().solve(corrs, square_corners(), Vec::new(), &CancelToken::new());
        assert_eq!(r.inlier_count, 63);
        assert_eq!(r.outlier_count, 1);
        assert!(r.reprojection_error_mm < 1e-6, "{}", r.reprojection_error_mm);
        assert!(r.quality > 0.999);
        assert!(r.correspondences[10].reprojection_error.unwrap_or(0.0) > 10.0);

        let inv = px_to_mm().inverse().expect("invertible");
        for (c, real) in r.corners.iter().zip(MarkerSpec::square(168.0).real_corners()) {
            assert!(distance(*c, inv.apply(real)) < 1e-6);
        }
    }

    #[test]
    fn predictions_never_constrain_the_fit() {
        let mut corrs = lattice(true);
        // a consistent but wrong set of predictions
        let shifted = Homography::from_array([[0.25, 0.01, -17.0], [-0.012, 0.26, -15.0], [1e-5, 2e-5, 1.0]]);
        corrs.extend(lattice(false).into_iter().map(|mut c| {
            c.real = shifted.apply(c.pixel);
            c.kind = CorrespondenceKind::GridCenter;
            c
        }));

        let r = pipeline().solve(corrs, square_corners(), Vec::new(), &CancelToken::new());

        assert_eq!(r.inlier_count + r.outlier_count, 64);
        assert!(r.reprojection_error_mm < 1e-6);
        let at = Point2::new(300.0, 250.0);
        assert!(distance(r.homography.apply(at), px_to_mm().apply(at)) < 1e-6);
        assert!(r
            .correspondences
            .iter()
            .filter(|c| !c.sub_pixel_refined)
            .all(|c| c.reprojection_error.is_some_and(|e| e > 2.5)));
    }

    #[test]
    fn predictions_alone_do_not_calibrate() {
        let r = pipeline().solve(lattice(false), square_corners(), Vec::new(), &CancelToken::new());
        assert_eq!(r.quality, 0.0);
        assert_eq!(r.homography, Homography::identity());
        assert_eq!(r.outlier_count, 0);
        assert!(r.correspondences.iter().all(|c| c.reprojection_error.is_none()));
    }

    #[test]
    fn blank_image_is_not_calibrated() {
        let img = RgbaImage::filled(200, 200, [200, 200, 200, 255]).unwrap();
        let corners = square_corners();
        let r = pipeline().run(&img.view(), corners);
        // no transitions, no saddles, no fiducials: only predictions
        assert_eq!(r.correspondences.len(), 4 + 49 + 36);
        assert!(r.correspondences.iter().all(|c| !c.sub_pixel_refined));
        assert!(!r.is_valid());
        assert_eq!(r.quality, 0.0);
        assert_eq!(r.homography, Homography::identity());
        assert_eq!(r.corners, corners);
        assert_eq!(r.passes, 1);
    }
}
