//! Band-structure check of candidate quads.
//!
//! Each side is sampled along a line parallel to it, inset to the middle of
//! the light band. Walking that line from one neighbouring side to the
//! other crosses dark band, light band, (pattern), light band, dark band;
//! the contrast between the outer "dark" and inner "light" zones tells a
//! printed marker apart from an arbitrary dark rectangle.

use serde::{Deserialize, Serialize};

use markerscale_core::{sample_luminosity, MarkerSpec, Quad, RgbaImageView};

use crate::frame::MarkerFrame;
use crate::params::StructureThresholds;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    /// Mean edge confidence, or 0 when too few edges pass.
    pub score: f64,
    /// Confidence per side `[top, right, bottom, left]`.
    pub edge_scores: [f64; 4],
    pub passing_edges: usize,
}

impl StructureReport {
    pub fn is_valid(&self, params: &StructureThresholds) -> bool {
        self.score >= params.min_score && self.passing_edges >= params.min_passing_edges
    }
}

/// Probe line of side `k` in marker-plane fractions.
fn sample_line(k: usize, d: f64) -> ((f64, f64), (f64, f64)) {
    match k {
        0 => ((0.0, d), (1.0, d)),
        1 => ((1.0 - d, 0.0), (1.0 - d, 1.0)),
        2 => ((1.0, 1.0 - d), (0.0, 1.0 - d)),
        _ => ((d, 1.0), (d, 0.0)),
    }
}

pub fn validate_structure(
    img: &RgbaImageView<'_>,
    quad: &Quad,
    spec: &MarkerSpec,
    params: &StructureThresholds,
) -> StructureReport {
    let Some(frame) = MarkerFrame::from_quad(quad) else {
        return StructureReport::default();
    };
    let outer = spec.outer_band_frac;
    let light_end = outer + spec.inner_band_frac;
    let depth = outer + 0.5 * spec.inner_band_frac;
    let n = params.samples_per_edge.max(12);

    let mut edge_scores = [0.0; 4];
    for (k, score) in edge_scores.iter_mut().enumerate() {
        let ((u0, v0), (u1, v1)) = sample_line(k, depth);
        let (mut dark, mut dark_n) = (0.0, 0usize);
        let (mut light, mut light_n) = (0.0, 0usize);
        for i in 0..n {
            let t = (i as f64 + 0.5) / n as f64;
            // distance from the nearer end of the sample line
            let e = t.min(1.0 - t);
            let p = frame.point(u0 + (u1 - u0) * t, v0 + (v1 - v0) * t);
            if !img.in_bounds(p.x.round() as i64, p.y.round() as i64) {
                continue;
            }
            let lum = sample_luminosity(img, p.x, p.y);
            if e < outer {
                dark += lum;
                dark_n += 1;
            } else if e < light_end {
                light += lum;
                light_n += 1;
            }
        }
        if dark_n == 0 || light_n == 0 {
            continue;
        }
        let contrast = light / light_n as f64 - dark / dark_n as f64;
        if contrast > params.min_contrast {
            *score = (contrast / (2.0 * params.min_contrast)).clamp(0.0, 1.0);
        }
    }

    let passing_edges = edge_scores
        .iter()
        .filter(|&&s| s >= params.min_edge_confidence)
        .count();
    let score = if passing_edges >= params.min_passing_edges {
        edge_scores.iter().sum::<f64>() / 4.0
    } else {
        0.0
    };
    StructureReport {
        score,
        edge_scores,
        passing_edges,
    }
}
