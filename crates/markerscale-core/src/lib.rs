//! Geometry and estimation core for photographed reference markers.
//!
//! Everything here is detector-agnostic: point and quad utilities, sub-pixel
//! sampling over RGBA buffers, the marker description, homography estimation
//! (4-point and N-point DLT), RANSAC, Levenberg–Marquardt refinement and the
//! measurement helpers that turn a pixel → millimetre homography into
//! distances.

mod cancel;
mod correspondence;
mod geometry;
mod homography;
mod image;
mod linalg;
mod logger;
mod marker;
mod measure;
mod ransac;
mod refine;
mod sampling;

pub use cancel::CancelToken;
pub use correspondence::{split_points, Correspondence, CorrespondenceKind};
pub use geometry::{
    angle_at, centroid, distance, line_intersection, order_corners, polygon_area, BoundingBox,
    HoughLine, Quad,
};
pub use homography::{
    estimate_homography, estimate_homography_dlt, homography_from_4pt, reprojection_error,
    rms_reprojection_error, Homography, HomographyError,
};
pub use image::{GrayImage, GrayImageView, ImageError, RgbaImage, RgbaImageView};
pub use linalg::{solve_gaussian, PIVOT_EPS};
pub use marker::{MarkerSpec, MarkerSpecError, DEFAULT_MARKER_SIDE_MM};
pub use measure::{
    detection_quality_score, distance_with_uncertainty, estimate_tilt,
    estimate_uncertainty_percent, format_measurement, homography_quality_percent, real_area,
    real_distance, DistanceMeasurement, LengthUnit, QuadMeasurements, Tilt,
};
pub use ransac::{
    adaptive_inlier_threshold, estimate_scale_ratio, ransac_correspondences, ransac_homography,
    recommended_min_inliers, RansacParams, RansacResult,
};
pub use refine::{
    refine_homography_lm, refine_homography_lm_weighted, weighted_rms_error, LmParams, LmResult,
};
pub use sampling::{
    directional_gradient, multiscale_gradient, parabolic_peak_offset, sample_luminosity,
    sample_sharpened, GRADIENT_HALF_STEPS, GRADIENT_WEIGHTS, UNSHARP_ALPHA, UNSHARP_RADIUS,
};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, TracingFormat};

pub use logger::{filter_from_env, init_with_filter, init_with_level, LogFilter, LOG_LEVEL_ENV};
