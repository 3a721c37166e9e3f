//! Sub-pixel location of printed band boundaries along a scan line.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use markerscale_core::{multiscale_gradient, parabolic_peak_offset, RgbaImageView};

use crate::params::TransitionParams;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub point: Point2<f64>,
    /// Signed multi-scale gradient at the peak, along `a → b`.
    pub strength: f64,
    /// Distance of the peak from the nominal position, along `a → b`.
    pub offset_px: f64,
}

/// Locate the band boundary nominally at `a + ratio · (b − a)`.
///
/// Scans ± `search_radius_px` around the nominal point along `a → b`,
/// takes the strongest multi-scale gradient of the sharpened luminosity and
/// refines it with a parabola through its neighbours. Peaks on the window
/// border or weaker than `min_gradient` are rejected.
pub fn find_subpixel_transition(
    img: &RgbaImageView<'_>,
    a: Point2<f64>,
    b: Point2<f64>,
    ratio: f64,
    params: &TransitionParams,
) -> Option<Transition> {
    let span = b - a;
    let len = span.norm();
    if len <= f64::EPSILON || params.scan_step_px <= 0.0 {
        return None;
    }
    let dir = span / len;
    let nominal = a + span * ratio;
    let half = (params.search_radius_px / params.scan_step_px).round() as i64;
    if half < 1 {
        return None;
    }

    let grads: Vec<f64> = (-half..=half)
        .map(|i| multiscale_gradient(img, nominal + dir * (i as f64 * params.scan_step_px), dir))
        .collect();
    let (best, peak) = grads
        .iter()
        .enumerate()
        .max_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))?;
    if best == 0 || best == grads.len() - 1 || peak.abs() < params.min_gradient {
        return None;
    }
    let delta = parabolic_peak_offset(
        grads[best - 1].abs(),
        peak.abs(),
        grads[best + 1].abs(),
    );
    let offset_px = ((best as i64 - half) as f64 + delta) * params.scan_step_px;
    Some(Transition {
        point: nominal + dir * offset_px,
        strength: *peak,
        offset_px,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerscale_core::RgbaImage;

    /// Vertical step edge at `edge_x`, area-averaged on 4 sub-columns.
    fn step(edge_x: f64) -> RgbaImage {
        let mut img = RgbaImage::filled(60, 20, [0, 0, 0, 255]).unwrap();
        for y in 0..20 {
            for x in 0..60 {
                let cover = (0..4)
                    .filter(|k| x as f64 - 0.5 + (*k as f64 + 0.5) / 4.0 >= edge_x)
                    .count() as f64
                    / 4.0;
                let v = (30.0 + 190.0 * cover).round() as u8;
                img.put_pixel(x, y, [v, v, v, 255]);
            }
        }
        img
    }

    #[test]
    fn locates_a_step_edge() {
        let img = step(30.0);
        let t = find_subpixel_transition(
            &img.view(),
            Point2::new(10.0, 10.0),
            Point2::new(50.0, 10.0),
            0.45,
            &TransitionParams::default(),
        )
        .expect("edge");
        assert!((t.point.x - 30.0).abs() < 0.2, "{t:?}");
        assert!((t.point.y - 10.0).abs() < 1e-9);
        assert!(t.strength > 0.0);
        assert!((t.offset_px - 2.0).abs() < 0.2);
    }

    #[test]
    fn direction_flips_the_sign() {
        let img = step(30.0);
        let t = find_subpixel_transition(
            &img.view(),
            Point2::new(50.0, 10.0),
            Point2::new(10.0, 10.0),
            0.5,
            &TransitionParams::default(),
        )
        .expect("edge");
        assert!(t.strength < 0.0);
        assert!((t.point.x - 30.0).abs() < 0.2);
    }

    #[test]
    fn rejects_flat_windows_and_far_edges() {
        let flat = RgbaImage::filled(60, 20, [120, 120, 120, 255]).unwrap();
        let params = TransitionParams::default();
        assert!(find_subpixel_transition(
            &flat.view(),
            Point2::new(10.0, 10.0),
            Point2::new(50.0, 10.0),
            0.5,
            &params
        )
        .is_none());
        // edge 10 px away from the nominal point: only the window border
        // sees its flank
        let img = step(30.0);
        assert!(find_subpixel_transition(
            &img.view(),
            Point2::new(0.0, 10.0),
            Point2::new(40.0, 10.0),
            0.5,
            &params
        )
        .is_none());
    }
}
