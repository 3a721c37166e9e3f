//! Ordered fallback chain of marker detection strategies.
//!
//! Each [`Detector`] proposes candidate quads for one [`DetectionStage`].
//! [`MarkerDetector`] refines the candidates of a stage, checks their size,
//! aspect and printed band structure, and stops at the first stage that
//! yields a validated candidate. When every stage comes up empty the outcome
//! is [`DetectionStage::Failed`] with no result.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use markerscale_core::{homography_from_4pt, Homography, MarkerSpec, Quad, RgbaImageView};

use crate::color::{detect_color_clusters, select_best_four, ColorClassifier, MagentaClassifier};
use crate::corner_refine::{refine_corner, CornerType};
use crate::edges::detect_edge_quads;
use crate::frame::MarkerFrame;
use crate::params::{
    BorderBoxThresholds, ColorThresholds, CornerRefineThresholds, DetectionThresholds,
    EdgeThresholds,
};
use crate::structure::{validate_structure, StructureReport};
use crate::tag::{marker_quad_from_tags, TagDecoder, TagLayout};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStage {
    AprilTagAttempt,
    EdgeLineAttempt,
    ColorBlobAttempt,
    BorderBoundingBoxFallback,
    Failed,
}

/// Starting points for border-line corner refinement, `[TL, TR, BR, BL]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSeeds {
    pub points: [Point2<f64>; 4],
    /// Typical seed size in pixels; bounds the search and the corner shift.
    pub size: f64,
}

impl CornerSeeds {
    /// Seeds in the middle of the outer band at each corner of `quad`.
    pub fn inset(quad: &Quad, spec: &MarkerSpec) -> Option<Self> {
        let frame = MarkerFrame::from_quad(quad)?;
        Some(Self {
            points: frame.fiducial_points(spec),
            size: frame.scale(spec.outer_band_frac),
        })
    }
}

/// A coarse marker outline proposed by one strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub quad: Quad,
    /// Strategy-specific ranking score.
    pub score: f64,
    /// Present when the corners should be refined on the printed border.
    pub seeds: Option<CornerSeeds>,
}

pub trait Detector {
    fn stage(&self) -> DetectionStage;

    /// Candidates in preference order; `None` when the stage found nothing.
    fn detect(&self, img: &RgbaImageView<'_>, spec: &MarkerSpec) -> Option<Vec<Candidate>>;
}

/// Corners from an external tag decoder.
pub struct TagStrategy<D> {
    pub decoder: D,
    pub layout: TagLayout,
}

impl<D: TagDecoder> Detector for TagStrategy<D> {
    fn stage(&self) -> DetectionStage {
        DetectionStage::AprilTagAttempt
    }

    fn detect(&self, img: &RgbaImageView<'_>, _spec: &MarkerSpec) -> Option<Vec<Candidate>> {
        let gray = img.to_gray();
        let tags = self.decoder.detect_tags(&gray.view());
        log::debug!("tags: {} decoded", tags.len());
        let quad = marker_quad_from_tags(&tags, &self.layout)?;
        Some(vec![Candidate {
            quad,
            score: 1.0,
            seeds: None,
        }])
    }
}

/// Quads assembled from Hough lines.
pub struct EdgeLineStrategy {
    pub params: EdgeThresholds,
}

impl Detector for EdgeLineStrategy {
    fn stage(&self) -> DetectionStage {
        DetectionStage::EdgeLineAttempt
    }

    fn detect(&self, img: &RgbaImageView<'_>, spec: &MarkerSpec) -> Option<Vec<Candidate>> {
        let out: Vec<Candidate> = detect_edge_quads(img, spec.expected_aspect(), &self.params)
            .into_iter()
            .map(|q| Candidate {
                seeds: CornerSeeds::inset(&q.quad, spec),
                quad: q.quad,
                score: q.score,
            })
            .collect();
        (!out.is_empty()).then_some(out)
    }
}

/// Four colour fiducials, one per corner.
pub struct ColorBlobStrategy<C> {
    pub classifier: C,
    pub params: ColorThresholds,
}

impl<C: ColorClassifier> ColorBlobStrategy<C> {
    pub fn new(classifier: C, params: ColorThresholds) -> Self {
        Self { classifier, params }
    }
}

impl<C: ColorClassifier> Detector for ColorBlobStrategy<C> {
    fn stage(&self) -> DetectionStage {
        DetectionStage::ColorBlobAttempt
    }

    fn detect(&self, img: &RgbaImageView<'_>, spec: &MarkerSpec) -> Option<Vec<Candidate>> {
        let clusters = detect_color_clusters(img, &self.classifier, &self.params);
        let four = select_best_four(&clusters, self.params.max_candidate_clusters)?;
        let centers = four.map(|c| c.center);
        // the dots sit inside the outer band; extrapolate to the outline
        let quad = MarkerFrame::from_fiducials(&centers, spec)?.quad();
        let size = four.iter().map(|c| c.size()).sum::<f64>() / 4.0;
        let score = quad.min_side() / quad.max_side().max(f64::EPSILON);
        Some(vec![Candidate {
            quad,
            score,
            seeds: Some(CornerSeeds {
                points: centers,
                size,
            }),
        }])
    }
}

/// Outline of all dark pixels, by diagonal extremes.
pub struct BorderBoxStrategy {
    pub params: BorderBoxThresholds,
}

impl Detector for BorderBoxStrategy {
    fn stage(&self) -> DetectionStage {
        DetectionStage::BorderBoundingBoxFallback
    }

    fn detect(&self, img: &RgbaImageView<'_>, spec: &MarkerSpec) -> Option<Vec<Candidate>> {
        let stride = self.params.stride.max(1);
        let mut sampled = 0usize;
        let mut dark = 0usize;
        // min x+y, max x-y, max x+y, min x-y
        let mut ext = [(f64::MAX, Point2::origin()); 4];
        for y in (0..img.height()).step_by(stride) {
            for x in (0..img.width()).step_by(stride) {
                sampled += 1;
                if img.luminosity(x as i64, y as i64) >= self.params.dark_threshold {
                    continue;
                }
                dark += 1;
                let p = Point2::new(x as f64, y as f64);
                let keys = [p.x + p.y, p.y - p.x, -(p.x + p.y), p.x - p.y];
                for (slot, key) in ext.iter_mut().zip(keys) {
                    if key < slot.0 {
                        *slot = (key, p);
                    }
                }
            }
        }
        let fraction = dark as f64 / sampled.max(1) as f64;
        log::debug!("border box: dark fraction {fraction:.4}");
        if fraction < self.params.min_dark_fraction {
            return None;
        }
        let quad = Quad::from_unordered(ext.map(|(_, p)| p));
        Some(vec![Candidate {
            seeds: CornerSeeds::inset(&quad, spec),
            quad,
            score: fraction,
        }])
    }
}

/// Candidate counts of one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAttempt {
    pub stage: DetectionStage,
    pub candidates: usize,
    pub validated: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Refined corners `[TL, TR, BR, BL]` in pixels.
    pub corners: [Point2<f64>; 4],
    /// Band-structure score in `[0, 1]`.
    pub score: f64,
    pub source: DetectionStage,
    /// Pixel → millimetre map from the four corners.
    pub homography: Homography,
    pub pixels_per_unit: f64,
    pub structure: StructureReport,
}

impl DetectionResult {
    pub fn quad(&self) -> Quad {
        Quad::from_ordered(self.corners)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// Stage that produced the result, or `Failed`.
    pub state: DetectionStage,
    pub result: Option<DetectionResult>,
    pub attempts: Vec<StageAttempt>,
}

impl DetectionOutcome {
    pub fn is_detected(&self) -> bool {
        self.result.is_some()
    }
}

/// The fallback chain.
pub struct MarkerDetector {
    stages: Vec<Box<dyn Detector>>,
    thresholds: DetectionThresholds,
}

impl MarkerDetector {
    pub fn new(stages: Vec<Box<dyn Detector>>, thresholds: DetectionThresholds) -> Self {
        Self { stages, thresholds }
    }

    /// Tags, Hough quads, magenta fiducials, then the dark-pixel outline.
    pub fn with_default_chain<D: TagDecoder + 'static>(
        decoder: D,
        thresholds: DetectionThresholds,
    ) -> Self {
        let stages: Vec<Box<dyn Detector>> = vec![
            Box::new(TagStrategy {
                decoder,
                layout: TagLayout::default(),
            }),
            Box::new(EdgeLineStrategy {
                params: thresholds.edge.clone(),
            }),
            Box::new(ColorBlobStrategy::new(
                MagentaClassifier::from_thresholds(&thresholds.color),
                thresholds.color.clone(),
            )),
            Box::new(BorderBoxStrategy {
                params: thresholds.border.clone(),
            }),
        ];
        Self::new(stages, thresholds)
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img, spec), fields(w = img.width(), h = img.height()))
    )]
    pub fn detect(&self, img: &RgbaImageView<'_>, spec: &MarkerSpec) -> DetectionOutcome {
        let mut attempts = Vec::with_capacity(self.stages.len());
        for detector in &self.stages {
            let stage = detector.stage();
            let candidates = detector.detect(img, spec).unwrap_or_default();
            let mut validated = 0usize;
            let mut best: Option<DetectionResult> = None;
            for cand in &candidates {
                let Some(result) = self.validate(img, spec, stage, cand) else {
                    continue;
                };
                validated += 1;
                if best.as_ref().is_none_or(|b| result.score > b.score) {
                    best = Some(result);
                }
            }
            log::debug!(
                "{stage:?}: {} candidates, {validated} validated",
                candidates.len()
            );
            attempts.push(StageAttempt {
                stage,
                candidates: candidates.len(),
                validated,
            });
            if let Some(result) = best {
                log::info!(
                    "marker found by {stage:?} (score {:.3}, {:.2} px/mm)",
                    result.score,
                    result.pixels_per_unit
                );
                return DetectionOutcome {
                    state: stage,
                    result: Some(result),
                    attempts,
                };
            }
        }
        log::info!("no marker found after {} stages", attempts.len());
        DetectionOutcome {
            state: DetectionStage::Failed,
            result: None,
            attempts,
        }
    }

    fn validate(
        &self,
        img: &RgbaImageView<'_>,
        spec: &MarkerSpec,
        stage: DetectionStage,
        cand: &Candidate,
    ) -> Option<DetectionResult> {
        let quad = match &cand.seeds {
            Some(seeds) => refine_quad(img, &cand.quad, seeds, &self.thresholds.corner),
            None => cand.quad,
        };
        let edge = &self.thresholds.edge;
        if !quad.is_convex()
            || quad.min_side() < edge.min_side_px
            || quad.aspect_ratio() > edge.max_aspect * spec.expected_aspect()
        {
            return None;
        }
        let structure = validate_structure(img, &quad, spec, &self.thresholds.structure);
        if !structure.is_valid(&self.thresholds.structure) {
            return None;
        }
        let homography = homography_from_4pt(&quad.corners, &spec.real_corners()).ok()?;
        Some(DetectionResult {
            corners: quad.corners,
            score: structure.score,
            source: stage,
            homography,
            pixels_per_unit: quad.mean_side() / spec.mean_side_mm(),
            structure,
        })
    }
}

/// Refine each corner on the printed border; unrefined corners keep the
/// candidate's position.
fn refine_quad(
    img: &RgbaImageView<'_>,
    quad: &Quad,
    seeds: &CornerSeeds,
    params: &CornerRefineThresholds,
) -> Quad {
    let mut corners = quad.corners;
    for (i, corner_type) in CornerType::ALL.into_iter().enumerate() {
        let r = refine_corner(img, seeds.points[i], corner_type, seeds.size, params);
        if r.refined {
            corners[i] = r.point;
        }
    }
    Quad::from_unordered(corners)
}
