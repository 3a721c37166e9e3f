//! JSON configuration and report helpers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use markerscale_core::{MarkerSpec, Tilt};
use markerscale_detect::{DetectionStage, DetectionThresholds, StageAttempt};

use crate::detect::Calibration;
use crate::precision::PrecisionParams;

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Everything needed to calibrate a photo; missing fields take defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub image_path: Option<String>,
    pub output_path: Option<String>,
    pub marker: MarkerSpec,
    pub thresholds: DetectionThresholds,
    pub precision: PrecisionParams,
    /// Skip the correspondence pipeline and report the 4-corner fit only.
    pub corners_only: bool,
}

impl CalibrationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("markerscale_report.json"))
    }
}

/// Serializable summary of one calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub state: DetectionStage,
    pub corners: Option<[Point2<f64>; 4]>,
    pub detection_score: f64,
    pub pixels_per_mm: Option<f64>,
    /// Best available pixel → millimetre homography, row-major.
    pub homography: [[f64; 3]; 3],
    pub quality: f64,
    pub reprojection_error_mm: Option<f64>,
    pub inlier_count: usize,
    pub correspondence_count: usize,
    /// Correspondences measured in the photo and fitted.
    #[serde(default)]
    pub measured_count: usize,
    pub tilt: Option<Tilt>,
    pub attempts: Vec<StageAttempt>,
}

impl CalibrationReport {
    pub fn from_calibration(cal: &Calibration) -> Self {
        let detection = cal.outcome.result.as_ref();
        let precision = cal.precision.as_ref().filter(|p| p.is_valid());
        Self {
            state: cal.outcome.state,
            corners: precision
                .map(|p| p.corners)
                .or_else(|| detection.map(|d| d.corners)),
            detection_score: detection.map_or(0.0, |d| d.score),
            pixels_per_mm: detection.map(|d| d.pixels_per_unit),
            homography: cal.homography().to_array(),
            quality: cal.quality(),
            reprojection_error_mm: precision.map(|p| p.reprojection_error_mm),
            inlier_count: precision.map_or(0, |p| p.inlier_count),
            correspondence_count: cal.precision.as_ref().map_or(0, |p| p.correspondences.len()),
            measured_count: cal.precision.as_ref().map_or(0, |p| {
                p.correspondences.iter().filter(|c| c.sub_pixel_refined).count()
            }),
            tilt: cal.precision.as_ref().map(|p| p.tilt),
            attempts: cal.outcome.attempts.clone(),
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
