mod common;

use common::{photo_homography, pixel_corners, render_marker, spec, RenderOptions, HEIGHT, WIDTH};
use markerscale::core::{distance, real_distance, GrayImageView, RgbaImage};
use markerscale::detection::CornerType;
use markerscale::{
    calibrate, CalibrationConfig, CalibrationReport, DetectionStage, NoTagDecoder, TagDetection,
};
use nalgebra::Point2;

fn config() -> CalibrationConfig {
    CalibrationConfig {
        marker: spec(),
        ..CalibrationConfig::default()
    }
}

#[test]
fn photo_without_tags_is_calibrated() {
    let h = photo_homography();
    let img = render_marker(&spec(), &h, WIDTH, HEIGHT, RenderOptions::default());
    let truth = pixel_corners(&spec(), &h);

    let cal = calibrate(&img.view(), &config(), NoTagDecoder).expect("valid input");

    assert!(cal.is_calibrated());
    assert_ne!(cal.outcome.state, DetectionStage::AprilTagAttempt);
    let detection = cal.outcome.result.as_ref().expect("detection");
    for (p, t) in detection.corners.iter().zip(truth) {
        assert!(distance(*p, t) < 1.0, "{p:?} vs {t:?}");
    }
    assert!(detection.score > 0.8);

    let precision = cal.precision.as_ref().expect("precision");
    assert!(precision.is_valid());
    assert!(precision.reprojection_error_mm < 0.5);
    let diagonal = real_distance(&cal.homography(), truth[0], truth[2]);
    assert!((diagonal - 168.0 * 2f64.sqrt()).abs() < 1.0, "{diagonal}");
}

#[test]
fn decoded_tags_are_used_first() {
    let h = photo_homography();
    let img = render_marker(&spec(), &h, WIDTH, HEIGHT, RenderOptions::default());
    let truth = pixel_corners(&spec(), &h);
    let decoder = move |_: &GrayImageView<'_>| -> Vec<TagDetection> {
        CornerType::ALL
            .into_iter()
            .zip(truth)
            .enumerate()
            .map(|(id, (ct, c))| {
                let d = -ct.outward() * 30.0;
                TagDetection {
                    id: id as u32,
                    corners: [
                        Point2::new(c.x + d.x, c.y + d.y),
                        Point2::new(c.x, c.y + d.y),
                        c,
                        Point2::new(c.x + d.x, c.y),
                    ],
                }
            })
            .collect()
    };

    let cal = calibrate(&img.view(), &config(), decoder).expect("valid input");

    assert_eq!(cal.outcome.state, DetectionStage::AprilTagAttempt);
    assert_eq!(cal.outcome.attempts.len(), 1);
    let precision = cal.precision.as_ref().expect("precision");
    assert!(precision.quality > 0.75, "{}", precision.quality);
}

#[test]
fn uniform_photo_fails_without_error() {
    let img = RgbaImage::filled(320, 240, [90, 110, 100, 255]).unwrap();
    let cal = calibrate(&img.view(), &config(), NoTagDecoder).expect("valid input");
    assert_eq!(cal.outcome.state, DetectionStage::Failed);
    assert!(cal.outcome.result.is_none());
    assert!(cal.precision.is_none());
    assert_eq!(cal.quality(), 0.0);
}

#[test]
fn corners_only_skips_the_pipeline() {
    let h = photo_homography();
    let img = render_marker(&spec(), &h, WIDTH, HEIGHT, RenderOptions::default());
    let cfg = CalibrationConfig {
        corners_only: true,
        ..config()
    };
    let cal = calibrate(&img.view(), &cfg, NoTagDecoder).expect("valid input");
    assert!(cal.is_calibrated());
    assert!(cal.precision.is_none());
    let detection = cal.outcome.result.as_ref().expect("detection");
    assert_eq!(cal.homography(), detection.homography);
}

#[test]
fn report_round_trips_through_json() {
    let h = photo_homography();
    let img = render_marker(&spec(), &h, WIDTH, HEIGHT, RenderOptions::default());
    let cal = calibrate(&img.view(), &config(), NoTagDecoder).expect("valid input");
    let report = cal.report();
    assert!(report.corners.is_some());
    assert!(report.inlier_count >= 24);
    assert!(report.measured_count >= report.inlier_count);
    assert!(report.correspondence_count > report.measured_count);
    assert!(report.pixels_per_mm.is_some_and(|p| p > 3.0 && p < 5.0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();
    let back = CalibrationReport::load_json(&path).unwrap();
    assert_eq!(back.state, report.state);
    assert_eq!(back.inlier_count, report.inlier_count);
    assert_eq!(back.corners, report.corners);
}
