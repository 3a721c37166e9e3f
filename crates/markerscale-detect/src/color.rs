//! Colour fiducial detection: classify, bucket, cluster, fit.
//!
//! The printed marker carries a saturated dot in each corner of its outer
//! band. Pixels are classified with a pluggable [`ColorClassifier`], grouped
//! into grid cells, merged into 8-connected clusters and reduced to one
//! centre per cluster (outline fit, optionally snapped to a white centre
//! spot).

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use markerscale_core::{order_corners, BoundingBox, Quad, RgbaImageView};

use crate::conic::{fit_center, sample_border_by_sector};
use crate::params::{ColorThresholds, WhiteCenterParams};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Decides whether an RGB triple belongs to a fiducial; returns a score.
pub trait ColorClassifier {
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<f32>;
}

impl<F> ColorClassifier for F
where
    F: Fn(u8, u8, u8) -> Option<f32>,
{
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<f32> {
        self(r, g, b)
    }
}

/// Saturated magenta: strong red and blue, suppressed green.
#[derive(Clone, Debug, PartialEq)]
pub struct MagentaClassifier {
    pub min_saturation: u8,
    pub max_green: u8,
    pub min_red_blue: u8,
    pub min_score: f32,
}

impl MagentaClassifier {
    pub fn from_thresholds(t: &ColorThresholds) -> Self {
        Self {
            min_saturation: t.min_saturation,
            max_green: t.max_green,
            min_red_blue: t.min_red_blue,
            min_score: t.min_score,
        }
    }
}

impl Default for MagentaClassifier {
    fn default() -> Self {
        Self::from_thresholds(&ColorThresholds::default())
    }
}

impl ColorClassifier for MagentaClassifier {
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<f32> {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let sat = max - min;
        if sat < self.min_saturation
            || g > self.max_green
            || r < self.min_red_blue
            || b < self.min_red_blue
            || g >= r
            || g >= b
        {
            return None;
        }
        let score = (r as f32 - g as f32) + (b as f32 - g as f32) + 0.5 * sat as f32;
        (score >= self.min_score).then_some(score)
    }
}

/// A classified pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorPixel {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// One colour blob after clustering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorCluster {
    /// Best centre estimate (fit, white spot or centroid).
    pub center: Point2<f64>,
    /// Score-weighted centroid of the member pixels.
    pub centroid: Point2<f64>,
    pub pixel_count: usize,
    pub bbox: BoundingBox,
    /// True when `center` comes from an outline fit.
    pub fitted: bool,
}

impl ColorCluster {
    /// Larger bounding-box side in pixels.
    pub fn size(&self) -> f64 {
        self.bbox.width().max(self.bbox.height()).max(1.0)
    }
}

/// Every pixel on the adaptive stride grid accepted by `classifier`.
pub fn classify_pixels<C: ColorClassifier + ?Sized>(
    img: &RgbaImageView<'_>,
    classifier: &C,
    params: &ColorThresholds,
) -> Vec<ColorPixel> {
    let stride = (img.width().min(img.height()) / params.stride_divisor.max(1)).max(1);
    let mut out = Vec::new();
    for y in (0..img.height()).step_by(stride) {
        for x in (0..img.width()).step_by(stride) {
            let [r, g, b, _] = img.rgba(x, y);
            if let Some(score) = classifier.classify(r, g, b) {
                out.push(ColorPixel { x, y, score });
            }
        }
    }
    out
}

/// Bucket pixels into square cells and merge 8-connected occupied cells.
///
/// Returns clusters sorted by pixel count, largest first. Clusters with too
/// few pixels or an elongated bounding box are dropped.
pub fn cluster_pixels(
    img: &RgbaImageView<'_>,
    pixels: &[ColorPixel],
    params: &ColorThresholds,
) -> Vec<ColorCluster> {
    let cell = params.cell_size_px.max(1.0);
    let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, p) in pixels.iter().enumerate() {
        let key = (
            (p.x as f64 / cell).floor() as i64,
            (p.y as f64 / cell).floor() as i64,
        );
        cells.entry(key).or_default().push(i);
    }

    let mut keys: Vec<(i64, i64)> = cells.keys().copied().collect();
    keys.sort_unstable();
    let mut visited: HashSet<(i64, i64)> = HashSet::with_capacity(keys.len());
    let mut clusters = Vec::new();

    for start in keys {
        if !visited.insert(start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        let mut members: Vec<usize> = Vec::new();
        while let Some((cx, cy)) = queue.pop_front() {
            if let Some(idx) = cells.get(&(cx, cy)) {
                members.extend_from_slice(idx);
            }
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let n = (cx + dx, cy + dy);
                    if (dx, dy) != (0, 0) && cells.contains_key(&n) && visited.insert(n) {
                        queue.push_back(n);
                    }
                }
            }
        }
        if members.len() < params.min_cluster_pixels {
            continue;
        }
        if let Some(cluster) = build_cluster(img, pixels, &members, params) {
            clusters.push(cluster);
        }
    }

    clusters.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count));
    clusters
}

fn build_cluster(
    img: &RgbaImageView<'_>,
    pixels: &[ColorPixel],
    members: &[usize],
    params: &ColorThresholds,
) -> Option<ColorCluster> {
    let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
    let first = pixels[members[0]];
    let mut min = Point2::new(first.x as f64, first.y as f64);
    let mut max = min;
    let mut points = Vec::with_capacity(members.len());
    for &i in members {
        let p = pixels[i];
        let (x, y) = (p.x as f64, p.y as f64);
        let w = (p.score as f64).max(1.0);
        sx += w * x;
        sy += w * y;
        sw += w;
        min.x = min.x.min(x);
        min.y = min.y.min(y);
        max.x = max.x.max(x);
        max.y = max.y.max(y);
        points.push(Point2::new(x, y));
    }
    let bbox = BoundingBox { min, max };
    let elongation = bbox.width().max(bbox.height()) / bbox.width().min(bbox.height()).max(1.0);
    if elongation >= params.max_elongation {
        return None;
    }
    let centroid = Point2::new(sx / sw, sy / sw);

    let border = sample_border_by_sector(&points, centroid, params.border_sectors);
    let fitted_center = (border.len() >= params.min_border_samples)
        .then(|| fit_center(&border, params.fit_mode))
        .flatten()
        .filter(|c| bbox.expanded(0.1).contains(*c));
    let mut center = fitted_center.unwrap_or(centroid);
    if params.white_center.enabled {
        // stay inside the dot
        let size = bbox.width().max(bbox.height());
        let white_params = WhiteCenterParams {
            radius_px: params.white_center.radius_px.min((0.4 * size) as i64),
            ..params.white_center.clone()
        };
        if let Some(white) = find_white_center(img, center, &white_params) {
            center = white;
        }
    }
    Some(ColorCluster {
        center,
        centroid,
        pixel_count: members.len(),
        bbox,
        fitted: fitted_center.is_some(),
    })
}

/// Classify and cluster in one go.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, classifier, params), fields(w = img.width(), h = img.height()))
)]
pub fn detect_color_clusters<C: ColorClassifier + ?Sized>(
    img: &RgbaImageView<'_>,
    classifier: &C,
    params: &ColorThresholds,
) -> Vec<ColorCluster> {
    let pixels = classify_pixels(img, classifier, params);
    if pixels.len() < params.min_classified_pixels {
        log::debug!("colour: {} classified pixels, not clustering", pixels.len());
        return Vec::new();
    }
    let clusters = cluster_pixels(img, &pixels, params);
    log::debug!(
        "colour: {} classified pixels, {} clusters",
        pixels.len(),
        clusters.len()
    );
    clusters
}

/// Choose the four clusters forming the most regular quad.
///
/// Considers the `max_considered` largest clusters (the input is expected
/// largest first) and maximizes `mean_side - 2 · mean |side - mean_side|`.
/// The result is ordered `[TL, TR, BR, BL]`.
pub fn select_best_four(
    clusters: &[ColorCluster],
    max_considered: usize,
) -> Option<[&ColorCluster; 4]> {
    let pool = &clusters[..clusters.len().min(max_considered.max(4))];
    if pool.len() < 4 {
        return None;
    }
    let mut best: Option<(f64, [usize; 4])> = None;
    let n = pool.len();
    for a in 0..n {
        for b in (a + 1)..n {
            for c in (b + 1)..n {
                for d in (c + 1)..n {
                    let idx = [a, b, c, d];
                    let quad = Quad::from_unordered(idx.map(|i| pool[i].center));
                    let sides = quad.sides();
                    let mean = sides.iter().sum::<f64>() / 4.0;
                    let mad = sides.iter().map(|s| (s - mean).abs()).sum::<f64>() / 4.0;
                    let score = mean - 2.0 * mad;
                    if best.is_none_or(|(s, _)| score > s) {
                        best = Some((score, idx));
                    }
                }
            }
        }
    }
    let (_, idx) = best?;
    let ordered = order_corners(idx.map(|i| pool[i].center));
    let mut out = [&pool[idx[0]]; 4];
    for (slot, p) in ordered.iter().enumerate() {
        let i = idx.iter().copied().find(|&i| pool[i].center == *p)?;
        out[slot] = &pool[i];
    }
    Some(out)
}

/// Brightness-weighted centre of near-white pixels around `approx`.
pub fn find_white_center(
    img: &RgbaImageView<'_>,
    approx: Point2<f64>,
    params: &WhiteCenterParams,
) -> Option<Point2<f64>> {
    let r = params.radius_px.max(0);
    let (cx, cy) = (approx.x.round() as i64, approx.y.round() as i64);
    let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
    let mut count = 0usize;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if !img.in_bounds(x, y) {
                continue;
            }
            let [pr, pg, pb, _] = img.rgba(x as usize, y as usize);
            let (fr, fg, fb) = (pr as f64, pg as f64, pb as f64);
            let brightness = (fr + fg + fb) / 3.0;
            let variance = (fr - brightness).abs() + (fg - brightness).abs() + (fb - brightness).abs();
            if brightness <= params.min_brightness || variance >= params.max_color_variance {
                continue;
            }
            let dist = ((dx * dx + dy * dy) as f64).sqrt();
            let w = brightness / (1.0 + params.distance_falloff * dist);
            sx += w * x as f64;
            sy += w * y as f64;
            sw += w;
            count += 1;
        }
    }
    (count >= 3 && sw > 0.0).then(|| Point2::new(sx / sw, sy / sw))
}
