//! Detection of a printed reference marker in a photo.
//!
//! The crate finds the marker outline through an ordered chain of
//! strategies ([`MarkerDetector`]): corner tags from an external decoder,
//! quads assembled from Hough lines, magenta corner fiducials, and finally
//! the outline of all dark pixels. Candidates are refined on the printed
//! border ([`refine_corner`]) and accepted only when the band structure of
//! the marker is visible ([`validate_structure`]).
//!
//! Lower-level building blocks are public as well: sub-pixel band
//! transitions ([`find_subpixel_transition`]), Harris refinement of pattern
//! corners ([`refine_harris`]) and circle/ellipse fits of blob outlines.
//!
//! ```no_run
//! use markerscale_core::{MarkerSpec, RgbaImageView};
//! use markerscale_detect::{DetectionThresholds, MarkerDetector, NoTagDecoder};
//!
//! # fn run(width: usize, height: usize, pixels: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let view = RgbaImageView::new(width, height, pixels)?;
//! let detector = MarkerDetector::with_default_chain(NoTagDecoder, DetectionThresholds::default());
//! let outcome = detector.detect(&view, &MarkerSpec::square(168.0));
//! if let Some(result) = outcome.result {
//!     println!("{:?}: {:.2} px/mm", outcome.state, result.pixels_per_unit);
//! }
//! # Ok(())
//! # }
//! ```

mod chain;
mod color;
mod conic;
mod corner_refine;
mod edges;
mod frame;
mod harris;
mod params;
mod structure;
mod tag;
mod transition;

#[cfg(test)]
mod test_utils;

pub use chain::{
    BorderBoxStrategy, Candidate, ColorBlobStrategy, CornerSeeds, DetectionOutcome,
    DetectionResult, DetectionStage, Detector, EdgeLineStrategy, MarkerDetector, StageAttempt,
    TagStrategy,
};
pub use color::{
    classify_pixels, cluster_pixels, detect_color_clusters, find_white_center, select_best_four,
    ColorClassifier, ColorCluster, ColorPixel, MagentaClassifier,
};
pub use conic::{
    fit_center, fit_circle_kasa, fit_ellipse_direct, sample_border_by_sector, Circle, Ellipse,
    FitMode,
};
pub use corner_refine::{refine_corner, CornerRefinement, CornerType};
pub use edges::{
    assemble_quads, detect_edge_quads, hough_lines, sobel, split_orientations, EdgeQuad, Gradients,
};
pub use frame::MarkerFrame;
pub use harris::{harris_response, refine_harris, HarrisRefinement};
pub use params::{
    BorderBoxThresholds, ColorThresholds, CornerRefineThresholds, DetectionThresholds,
    EdgeThresholds, HarrisParams, StructureThresholds, TransitionParams, WhiteCenterParams,
};
pub use structure::{validate_structure, StructureReport};
pub use tag::{marker_quad_from_tags, NoTagDecoder, TagDecoder, TagDetection, TagLayout};
pub use transition::{find_subpixel_transition, Transition};
