mod common;

use approx::assert_abs_diff_eq;
use common::{photo_homography, pixel_corners, render_marker, spec, RenderOptions, HEIGHT, WIDTH};
use markerscale::core::{distance, real_distance, CorrespondenceKind};
use markerscale::UltraPrecisionPipeline;
use nalgebra::{Point2, Vector2};

#[test]
fn exact_corners_give_a_sub_millimetre_fit() {
    let spec = spec();
    let h = photo_homography();
    let img = render_marker(&spec, &h, WIDTH, HEIGHT, RenderOptions::default());
    let corners = pixel_corners(&spec, &h);

    let result = UltraPrecisionPipeline::with_defaults(spec).run(&img.view(), corners);

    assert!(result.quality > 0.75, "quality {}", result.quality);
    assert!(result.reprojection_error_mm < 0.5);
    assert_eq!(result.correspondences.len(), 4 + 16 + 49 + 36);
    // without fiducials the input corners are not measurements
    assert!(result
        .correspondences
        .iter()
        .filter(|c| c.kind == CorrespondenceKind::Corner || c.kind == CorrespondenceKind::GridCenter)
        .all(|c| !c.sub_pixel_refined));
    assert_eq!(result.inlier_count + result.outlier_count, 32);
    let transitions = result
        .correspondences
        .iter()
        .filter(|c| c.kind == CorrespondenceKind::EdgeTransition)
        .count();
    assert_eq!(transitions, 16);
    assert!(result.confidence > 0.9);
    assert!(result.correspondences.iter().all(|c| c.reprojection_error.is_some()));

    let diagonal = real_distance(&result.homography, corners[0], corners[2]);
    assert_abs_diff_eq!(diagonal, 168.0 * 2f64.sqrt(), epsilon = 0.3);
}

#[test]
fn pattern_cells_are_classified() {
    let spec = spec();
    let h = photo_homography();
    let img = render_marker(&spec, &h, WIDTH, HEIGHT, RenderOptions::default());
    let result = UltraPrecisionPipeline::with_defaults(spec).run(&img.view(), pixel_corners(&spec, &h));

    assert_eq!(result.grid_pattern.len(), 36);
    for row in 0..6 {
        for col in 0..6 {
            let (r, c) = (row.min(5 - row), col.min(5 - col));
            assert_eq!(result.grid_pattern[row * 6 + col], (r + c) % 2 == 1, "cell {row},{col}");
        }
    }
}

#[test]
fn saddle_points_are_refined() {
    let spec = spec();
    let h = photo_homography();
    let img = render_marker(&spec, &h, WIDTH, HEIGHT, RenderOptions::default());
    let result = UltraPrecisionPipeline::with_defaults(spec).run(&img.view(), pixel_corners(&spec, &h));

    let refined: Vec<_> = result
        .correspondences
        .iter()
        .filter(|c| c.kind == CorrespondenceKind::GridCorner && c.sub_pixel_refined)
        .collect();
    // interior junctions off the mirror lines
    assert_eq!(refined.len(), 16);
    for c in refined {
        let truth = h.apply(c.real);
        assert!(distance(c.pixel, truth) < 0.15, "{:?} vs {truth:?}", c.pixel);
    }
}

#[test]
fn fiducials_pull_perturbed_corners_back() {
    let spec = spec();
    let h = photo_homography();
    let opts = RenderOptions {
        dots: true,
        ..RenderOptions::default()
    };
    let img = render_marker(&spec, &h, WIDTH, HEIGHT, opts);
    let truth = pixel_corners(&spec, &h);
    let offsets = [
        Vector2::new(1.2, -0.8),
        Vector2::new(-1.0, 1.1),
        Vector2::new(0.9, 0.9),
        Vector2::new(-1.3, -0.6),
    ];
    let perturbed: [Point2<f64>; 4] = std::array::from_fn(|k| truth[k] + offsets[k]);

    let result = UltraPrecisionPipeline::with_defaults(spec).run(&img.view(), perturbed);

    for (p, t) in result.corners.iter().zip(truth) {
        assert!(distance(*p, t) < 0.5, "{p:?} vs {t:?}");
    }
    assert!(result
        .correspondences
        .iter()
        .filter(|c| c.kind == CorrespondenceKind::Corner)
        .all(|c| c.sub_pixel_refined));
    assert!(result.reprojection_error_mm < 0.5);
}

#[test]
fn noisy_photo_still_fits() {
    let spec = spec();
    let h = photo_homography();
    let opts = RenderOptions {
        noise: 6.0,
        seed: 42,
        ..RenderOptions::default()
    };
    let img = render_marker(&spec, &h, WIDTH, HEIGHT, opts);
    let corners = pixel_corners(&spec, &h);
    let result = UltraPrecisionPipeline::with_defaults(spec).run(&img.view(), corners);

    assert!(result.is_valid());
    assert!(result.reprojection_error_mm < 0.5);
    let side = real_distance(&result.homography, corners[0], corners[1]);
    assert_abs_diff_eq!(side, 168.0, epsilon = 0.5);
}

#[test]
fn perturbed_corners_are_corrected_by_the_structure() {
    let spec = spec();
    let h = photo_homography();
    let img = render_marker(&spec, &h, WIDTH, HEIGHT, RenderOptions::default());
    let truth = pixel_corners(&spec, &h);
    let offsets = [
        Vector2::new(2.0, -1.6),
        Vector2::new(-1.8, 2.0),
        Vector2::new(2.2, 1.6),
        Vector2::new(-2.0, -1.8),
    ];
    let perturbed: [Point2<f64>; 4] = std::array::from_fn(|k| truth[k] + offsets[k]);

    let result = UltraPrecisionPipeline::with_defaults(spec).run(&img.view(), perturbed);

    assert!(result.is_valid());
    assert!(result.passes > 1);
    for k in 0..4 {
        let before = distance(perturbed[k], truth[k]);
        let after = distance(result.corners[k], truth[k]);
        assert!(after < 0.75, "corner {k}: {after} px");
        assert!(after < 0.5 * before);
    }
    let side = real_distance(&result.homography, truth[0], truth[1]);
    assert_abs_diff_eq!(side, 168.0, epsilon = 0.5);
}
