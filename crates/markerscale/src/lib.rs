//! Pixel → millimetre calibration from a photographed reference marker.
//!
//! This crate provides:
//! - re-exports of the geometry core ([`core`]) and the marker detectors
//!   ([`detection`]),
//! - the [`UltraPrecisionPipeline`], which turns four marker corners into a
//!   homography fitted over ~100 correspondences with RANSAC and
//!   Levenberg–Marquardt,
//! - end-to-end helpers ([`calibrate`], [`calibrate_rgba`]) and JSON
//!   config/report types.
//!
//! ## Quickstart
//!
//! ```no_run
//! use markerscale::{calibrate_rgba, CalibrationConfig, NoTagDecoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let (width, height, pixels) = (1usize, 1usize, vec![0u8; 4]);
//! let config = CalibrationConfig::default();
//! let cal = calibrate_rgba(width, height, &pixels, &config, NoTagDecoder)?;
//! if cal.is_calibrated() {
//!     let h = cal.homography();
//!     println!("quality {:.3}, H = {:?}", cal.quality(), h.to_array());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Measurements follow from the homography with
//! [`core::real_distance`](markerscale_core::real_distance) and friends.
//! Always check the quality before trusting them.

pub use markerscale_core as core;
pub use markerscale_detect as detection;

pub use markerscale_core::{
    Correspondence, CorrespondenceKind, Homography, MarkerSpec, RgbaImage, RgbaImageView,
};
pub use markerscale_detect::{
    DetectionOutcome, DetectionResult, DetectionStage, DetectionThresholds, MarkerDetector,
    NoTagDecoder, TagDecoder, TagDetection,
};

pub mod detect;
pub mod io;
pub mod precision;

#[cfg(feature = "image")]
pub use detect::rgba_view;
pub use detect::{calibrate, calibrate_rgba, Calibration, DetectError};
pub use io::{CalibrationConfig, CalibrationReport, IoError};
pub use precision::{PrecisionParams, UltraPrecisionPipeline, UltraPrecisionResult};
