use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Where a correspondence came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrespondenceKind {
    Corner,
    EdgeTransition,
    GridCorner,
    GridCenter,
}

/// One pixel ↔ real-world pairing used for homography fitting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub pixel: Point2<f64>,
    pub real: Point2<f64>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub kind: CorrespondenceKind,
    pub sub_pixel_refined: bool,
    /// Final reprojection error in real units, once a homography is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprojection_error: Option<f64>,
}

impl Correspondence {
    pub fn new(
        pixel: Point2<f64>,
        real: Point2<f64>,
        confidence: f64,
        kind: CorrespondenceKind,
        sub_pixel_refined: bool,
    ) -> Self {
        Self {
            pixel,
            real,
            confidence: confidence.clamp(0.0, 1.0),
            kind,
            sub_pixel_refined,
            reprojection_error: None,
        }
    }
}

/// Split correspondences into `(pixels, reals)` point lists.
pub fn split_points(corrs: &[Correspondence]) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    corrs.iter().map(|c| (c.pixel, c.real)).unzip()
}
