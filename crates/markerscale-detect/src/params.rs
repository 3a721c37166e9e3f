//! Tunable thresholds for every detector, grouped per stage.
//!
//! Defaults reproduce the constants the detectors were tuned with on
//! phone photographs of the printed marker.

use serde::{Deserialize, Serialize};

use crate::conic::FitMode;

/// Colour fiducial detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorThresholds {
    /// Minimum `max(r,g,b) - min(r,g,b)`.
    pub min_saturation: u8,
    pub max_green: u8,
    /// Both red and blue must reach this level.
    pub min_red_blue: u8,
    /// Minimum `(r - g) + (b - g) + 0.5 * saturation`.
    pub min_score: f32,
    /// Scan stride is `max(1, min(w, h) / stride_divisor)`.
    pub stride_divisor: usize,
    /// Below this many classified pixels no clustering is attempted.
    pub min_classified_pixels: usize,
    pub cell_size_px: f64,
    pub min_cluster_pixels: usize,
    /// Bounding-box elongation must stay below this.
    pub max_elongation: f64,
    /// Largest clusters considered when choosing the best four.
    pub max_candidate_clusters: usize,
    pub border_sectors: usize,
    /// Fitted centres need at least this many border samples.
    pub min_border_samples: usize,
    pub fit_mode: FitMode,
    pub white_center: WhiteCenterParams,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            min_saturation: 50,
            max_green: 140,
            min_red_blue: 70,
            min_score: 140.0,
            stride_divisor: 900,
            min_classified_pixels: 20,
            cell_size_px: 12.0,
            min_cluster_pixels: 6,
            max_elongation: 2.5,
            max_candidate_clusters: 8,
            border_sectors: 16,
            min_border_samples: 8,
            fit_mode: FitMode::Auto,
            white_center: WhiteCenterParams::default(),
        }
    }
}

/// Search for a white spot printed inside ring-shaped fiducials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteCenterParams {
    pub enabled: bool,
    pub radius_px: i64,
    pub min_brightness: f64,
    /// Maximum summed channel deviation from the grey level.
    pub max_color_variance: f64,
    /// Weight is `brightness / (1 + falloff * distance)`.
    pub distance_falloff: f64,
}

impl Default for WhiteCenterParams {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_px: 10,
            min_brightness: 175.0,
            max_color_variance: 70.0,
            distance_falloff: 0.6,
        }
    }
}

/// Sobel + Hough line detection and quad assembly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeThresholds {
    pub theta_bins: usize,
    pub pixel_stride: usize,
    /// Edge pixels need this fraction of the strongest gradient.
    pub edge_threshold_frac: f64,
    /// Absolute gradient floor; uniform images produce no edges.
    pub min_edge_magnitude: f64,
    /// Peaks need this fraction of the strongest accumulator cell.
    pub vote_threshold_frac: f64,
    pub min_votes: u32,
    pub max_lines: usize,
    pub duplicate_theta_deg: f64,
    pub duplicate_rho_px: f64,
    /// Lines within this angle of horizontal/vertical are kept.
    pub axis_tolerance_deg: f64,
    /// Quad corners may lie this fraction outside the image.
    pub bounds_margin_frac: f64,
    pub min_side_px: f64,
    pub max_aspect: f64,
    pub max_candidates: usize,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self {
            theta_bins: 180,
            pixel_stride: 2,
            edge_threshold_frac: 0.25,
            min_edge_magnitude: 40.0,
            vote_threshold_frac: 0.3,
            min_votes: 15,
            max_lines: 24,
            duplicate_theta_deg: 5.0,
            duplicate_rho_px: 10.0,
            axis_tolerance_deg: 30.0,
            bounds_margin_frac: 0.1,
            min_side_px: 30.0,
            max_aspect: 1.8,
            max_candidates: 10,
        }
    }
}

/// Band-structure validation of candidate quads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureThresholds {
    pub samples_per_edge: usize,
    /// Light-minus-dark luminosity an edge needs to count at all.
    pub min_contrast: f64,
    pub min_edge_confidence: f64,
    pub min_passing_edges: usize,
    /// Candidates scoring below this are rejected.
    pub min_score: f64,
}

impl Default for StructureThresholds {
    fn default() -> Self {
        Self {
            samples_per_edge: 60,
            min_contrast: 30.0,
            min_edge_confidence: 0.5,
            min_passing_edges: 2,
            min_score: 0.4,
        }
    }
}

/// Border-line corner refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerRefineThresholds {
    /// Luminosity below this counts as printed black.
    pub black_threshold: f64,
    pub min_dark_run: usize,
    /// Outward scan length as a multiple of the seed size.
    pub scan_factor: f64,
    /// Border-following length as a multiple of the seed size.
    pub follow_factor: f64,
    /// Half-width of the perpendicular search while following a line.
    pub follow_search_px: f64,
    pub min_line_points: usize,
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
    /// Refined corners farther than this multiple of the seed size from
    /// the seed are discarded.
    pub max_distance_factor: f64,
}

impl Default for CornerRefineThresholds {
    fn default() -> Self {
        Self {
            black_threshold: 100.0,
            min_dark_run: 5,
            scan_factor: 2.0,
            follow_factor: 1.5,
            follow_search_px: 3.0,
            min_line_points: 6,
            min_angle_deg: 70.0,
            max_angle_deg: 110.0,
            max_distance_factor: 2.0,
        }
    }
}

/// Sub-pixel band transition search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionParams {
    pub search_radius_px: f64,
    pub scan_step_px: f64,
    /// Peaks with a weaker multi-scale gradient are ignored.
    pub min_gradient: f64,
}

impl Default for TransitionParams {
    fn default() -> Self {
        Self {
            search_radius_px: 6.0,
            scan_step_px: 0.5,
            min_gradient: 8.0,
        }
    }
}

/// Harris corner check and gradient-orthogonality refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarrisParams {
    pub k: f64,
    /// Half-size of the refinement window.
    pub window_radius: i64,
    /// Minimum ratio of the smaller to the larger structure-tensor
    /// eigenvalue.
    pub min_eigen_ratio: f64,
    /// Minimum mean squared gradient inside the window.
    pub min_gradient_energy: f64,
    pub max_shift_px: f64,
    pub iterations: usize,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            k: 0.04,
            window_radius: 5,
            min_eigen_ratio: 0.1,
            min_gradient_energy: 25.0,
            max_shift_px: 2.5,
            iterations: 6,
        }
    }
}

/// Dark-pixel bounding box fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderBoxThresholds {
    pub dark_threshold: f64,
    pub min_dark_fraction: f64,
    pub stride: usize,
}

impl Default for BorderBoxThresholds {
    fn default() -> Self {
        Self {
            dark_threshold: 80.0,
            min_dark_fraction: 0.005,
            stride: 2,
        }
    }
}

/// Every detection threshold in one serializable bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    pub color: ColorThresholds,
    pub edge: EdgeThresholds,
    pub structure: StructureThresholds,
    pub corner: CornerRefineThresholds,
    pub transition: TransitionParams,
    pub harris: HarrisParams,
    pub border: BorderBoxThresholds,
}
