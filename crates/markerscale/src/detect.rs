//! End-to-end calibration: marker detection followed by the precision
//! pipeline.

use markerscale_core::{Homography, ImageError, MarkerSpecError, RgbaImageView};
use markerscale_detect::{DetectionOutcome, MarkerDetector, TagDecoder};

use crate::io::{CalibrationConfig, CalibrationReport};
use crate::precision::{UltraPrecisionPipeline, UltraPrecisionResult};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the high-level helpers. A photo without a detectable
/// marker is not an error; see [`Calibration::is_calibrated`].
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    MarkerSpec(#[from] MarkerSpecError),
}

#[derive(Clone, Debug)]
pub struct Calibration {
    pub outcome: DetectionOutcome,
    /// Present when a marker was found and the pipeline ran.
    pub precision: Option<UltraPrecisionResult>,
}

impl Calibration {
    pub fn is_calibrated(&self) -> bool {
        self.outcome.result.is_some()
    }

    /// Precision homography when valid, else the 4-corner one, else identity.
    pub fn homography(&self) -> Homography {
        match (&self.precision, &self.outcome.result) {
            (Some(p), _) if p.is_valid() => p.homography,
            (_, Some(d)) => d.homography,
            _ => Homography::identity(),
        }
    }

    /// Precision quality when available, else the detection score.
    pub fn quality(&self) -> f64 {
        match (&self.precision, &self.outcome.result) {
            (Some(p), _) if p.is_valid() => p.quality,
            (_, Some(d)) => d.score,
            _ => 0.0,
        }
    }

    pub fn report(&self) -> CalibrationReport {
        CalibrationReport::from_calibration(self)
    }
}

/// Detect the marker with the default strategy chain and, unless
/// `config.corners_only` is set, refine the homography from the printed
/// structure.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, config, decoder), fields(w = img.width(), h = img.height()))
)]
pub fn calibrate<D: TagDecoder + 'static>(
    img: &RgbaImageView<'_>,
    config: &CalibrationConfig,
    decoder: D,
) -> Result<Calibration, DetectError> {
    config.marker.validate()?;
    let detector = MarkerDetector::with_default_chain(decoder, config.thresholds.clone());
    let outcome = detector.detect(img, &config.marker);
    let precision = match &outcome.result {
        Some(result) if !config.corners_only => {
            let pipeline = UltraPrecisionPipeline::new(
                config.marker,
                config.thresholds.clone(),
                config.precision.clone(),
            );
            Some(pipeline.run(img, result.corners))
        }
        _ => None,
    };
    Ok(Calibration { outcome, precision })
}

/// [`calibrate`] over a raw RGBA8 buffer.
pub fn calibrate_rgba<D: TagDecoder + 'static>(
    width: usize,
    height: usize,
    pixels: &[u8],
    config: &CalibrationConfig,
    decoder: D,
) -> Result<Calibration, DetectError> {
    let view = RgbaImageView::new(width, height, pixels)?;
    calibrate(&view, config, decoder)
}

/// Borrow an `image::RgbaImage` as the lightweight view type.
#[cfg(feature = "image")]
pub fn rgba_view(img: &::image::RgbaImage) -> Result<RgbaImageView<'_>, DetectError> {
    Ok(RgbaImageView::new(
        img.width() as usize,
        img.height() as usize,
        img.as_raw(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerscale_core::MarkerSpec;
    use markerscale_detect::{DetectionStage, NoTagDecoder};

    #[test]
    fn bad_buffers_are_rejected() {
        let err = calibrate_rgba(10, 10, &[0; 12], &CalibrationConfig::default(), NoTagDecoder)
            .unwrap_err();
        assert!(matches!(err, DetectError::Image(ImageError::InvalidBufferLength { .. })));
    }

    #[test]
    fn bad_marker_specs_are_rejected() {
        let config = CalibrationConfig {
            marker: MarkerSpec::square(-1.0),
            ..CalibrationConfig::default()
        };
        let err = calibrate_rgba(4, 4, &[0; 64], &config, NoTagDecoder).unwrap_err();
        assert!(matches!(err, DetectError::MarkerSpec(_)));
    }

    #[test]
    fn blank_photo_is_not_an_error() {
        let pixels = vec![180; 120 * 90 * 4];
        let cal = calibrate_rgba(120, 90, &pixels, &CalibrationConfig::default(), NoTagDecoder)
            .expect("valid buffer");
        assert!(!cal.is_calibrated());
        assert_eq!(cal.outcome.state, DetectionStage::Failed);
        assert!(cal.precision.is_none());
        assert_eq!(cal.homography(), Homography::identity());
        assert_eq!(cal.quality(), 0.0);
        let report = cal.report();
        assert!(report.corners.is_none());
        assert_eq!(report.attempts.len(), 4);
    }
}
