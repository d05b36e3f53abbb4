mod common;

use common::init_logger;
use common::synthetic_image::{bumped_step_edge, gaussian_blob, step_edge, BlobField};
use cv_sift::{Gaussian, GrayImageBuffer, Pyramid, SiftDetector, SiftError, SiftParams};
use image::{DynamicImage, ImageBuffer, Luma};
use std::f32::consts::TAU;

fn angular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

#[test]
fn isolated_blob_yields_single_keypoint_at_its_scale() {
    init_logger();
    let sigma = 6.0;
    let image = gaussian_blob(128, (64.0, 64.0), sigma, 0.2, 0.6, 0.0);
    let detection = SiftDetector::default().detect(&image).unwrap();

    assert_eq!(detection.keypoints.len(), 1, "{:?}", detection.keypoints);
    let kp = &detection.keypoints[0];
    assert!(
        (kp.sigma - sigma).abs() < 0.25 * sigma,
        "keypoint sigma {} far from blob sigma {sigma}",
        kp.sigma
    );
    assert!((kp.point.0 - 64.0).abs() < 0.5 && (kp.point.1 - 64.0).abs() < 0.5);
    // a bright blob is a minimum of the difference of Gaussians
    assert!(kp.response < 0.0);
    assert_eq!(kp.octave, 1);

    // the isotropic blob has no preferred direction; sampling on the pixel grid
    // leaves near-equal histogram peaks about every π/4, so up to 8 orientations
    // are reported, all sharing the same location and scale
    assert!(!detection.descriptors.is_empty());
    for d in &detection.descriptors {
        assert_eq!(d.position(), kp.point);
        assert_eq!(d.scale, kp.sigma);
    }
    assert_eq!(detection.stats.keypoints, 1);
    assert_eq!(detection.stats.descriptors, detection.descriptors.len());
}

#[test]
fn blob_on_ramp_yields_single_descriptor() {
    init_logger();
    let sigma = 6.0;
    let image = gaussian_blob(128, (64.0, 64.0), sigma, 0.15, 0.5, 0.004);
    let descriptors = SiftDetector::default().extract_luma(&image).unwrap();

    assert_eq!(descriptors.len(), 1, "{descriptors:?}");
    let d = &descriptors[0];
    assert!((d.scale - sigma).abs() < 0.25 * sigma, "scale {}", d.scale);
    assert!((d.x - 64.0).abs() < 0.5 && (d.y - 64.0).abs() < 0.5);
    // the ramp rises along +x
    assert!(angular_distance(d.orientation, 0.0) < 0.1, "orientation {}", d.orientation);
}

#[test]
fn dark_blob_is_a_maximum() {
    let image = gaussian_blob(128, (64.0, 64.0), 6.0, 0.8, -0.6, 0.0);
    let detection = SiftDetector::default().detect(&image).unwrap();
    assert_eq!(detection.keypoints.len(), 1);
    assert!(detection.keypoints[0].response > 0.0);
}

#[test]
fn dynamic_image_is_converted_to_unit_range() {
    let luma = gaussian_blob(128, (64.0, 64.0), 6.0, 0.15, 0.5, 0.004);
    let bytes = ImageBuffer::from_fn(128, 128, |x, y| {
        Luma([(luma.get_pixel(x, y).0[0].clamp(0.0, 1.0) * 255.0).round() as u8])
    });
    let descriptors = SiftDetector::default()
        .extract(&DynamicImage::ImageLuma8(bytes))
        .unwrap();

    assert!(descriptors
        .iter()
        .any(|d| (d.x - 64.0).abs() < 1.0 && (d.y - 64.0).abs() < 1.0));
}

#[test]
fn flat_image_has_no_keypoints() {
    let image = ImageBuffer::from_pixel(96, 96, Luma([0.5f32]));
    let detection = SiftDetector::default().detect(&image).unwrap();
    assert!(detection.keypoints.is_empty());
    assert!(detection.descriptors.is_empty());
    assert_eq!(detection.stats.candidates, 0);
}

#[test]
fn straight_step_edge_has_no_keypoints() {
    for edge_x in [48.0, 48.5] {
        let image = step_edge(96, 96, edge_x, 0.2, 0.8);
        let detection = SiftDetector::default().detect(&image).unwrap();
        assert!(
            detection.keypoints.is_empty(),
            "edge at {edge_x}: {:?}",
            detection.keypoints
        );
    }
}

#[test]
fn candidates_along_step_edge_fail_curvature_test() {
    init_logger();
    for edge_x in [48.0, 48.5] {
        // the bump breaks the symmetry along the edge so that the scan finds
        // extrema on it, whose principal curvatures still differ by far more
        // than the default ratio of 10
        let image = bumped_step_edge(96, 96, edge_x, 0.2, 0.8, (0.05, 4.0));

        let detection = SiftDetector::default().detect(&image).unwrap();
        assert!(detection.stats.candidates > 0);
        assert!(detection.stats.edge_response >= 1, "{:?}", detection.stats);
        assert!(
            detection.keypoints.is_empty(),
            "edge at {edge_x}: {:?}",
            detection.keypoints
        );

        let relaxed = SiftDetector::new(SiftParams {
            curvature_ratio_threshold: 1000.0,
            ..Default::default()
        })
        .unwrap()
        .detect(&image)
        .unwrap();
        assert_eq!(relaxed.stats.edge_response, 0, "{:?}", relaxed.stats);
        assert!(!relaxed.keypoints.is_empty());
    }
}

#[test]
fn image_too_small_for_octaves_is_rejected() {
    let detector = SiftDetector::default();
    let octaves = detector.params().octave_count as u32;

    // any dimension of at most 2^octave_count pixels cannot hold the pyramid
    let side = 1u32 << octaves;
    let narrow: GrayImageBuffer = ImageBuffer::from_pixel(side, 256, Luma([0.5]));
    assert!(matches!(
        detector.detect(&narrow),
        Err(SiftError::ImageTooSmall { width, .. }) if width == side
    ));
    let short: GrayImageBuffer = ImageBuffer::from_pixel(256, side, Luma([0.5]));
    assert!(matches!(
        detector.extract_luma(&short),
        Err(SiftError::ImageTooSmall { .. })
    ));

    // fewer octaves make the same image acceptable
    let detector = SiftDetector::new(SiftParams {
        octave_count: 1,
        ..Default::default()
    })
    .unwrap();
    assert!(detector.detect(&narrow).is_ok());
}

#[test]
fn invalid_parameters_are_rejected() {
    let params = SiftParams {
        levels_per_octave: 0,
        ..Default::default()
    };
    assert!(matches!(
        SiftDetector::new(params),
        Err(SiftError::InvalidParameter {
            name: "levels_per_octave",
            ..
        })
    ));

    // a zero border would let the scan step outside the image
    let params = SiftParams {
        image_border: 0,
        ..Default::default()
    };
    assert!(matches!(
        SiftDetector::new(params.clone()),
        Err(SiftError::InvalidParameter {
            name: "image_border",
            ..
        })
    ));
    let image: GrayImageBuffer = ImageBuffer::from_pixel(96, 96, Luma([0.5]));
    assert!(matches!(
        Pyramid::<Gaussian>::build_gaussian(&image, &params),
        Err(SiftError::InvalidParameter {
            name: "image_border",
            ..
        })
    ));
}

#[test]
fn emitted_records_satisfy_invariants() {
    init_logger();
    let params = SiftParams::default();
    let image = BlobField::random(7, 200, -30.0, 190.0).render(160, 0.0, 1.0);
    let detection = SiftDetector::new(params.clone())
        .unwrap()
        .detect(&image)
        .unwrap();

    assert!(detection.keypoints.len() > 10);
    assert!(detection.descriptors.len() >= detection.keypoints.len() / 2);
    assert_eq!(detection.stats.keypoints, detection.keypoints.len());
    assert_eq!(detection.stats.descriptors, detection.descriptors.len());
    assert_eq!(
        detection.stats.candidates,
        detection.stats.keypoints + detection.stats.duplicates + detection.stats.rejected()
    );

    for pair in detection.keypoints.windows(2) {
        assert!(pair[0].response.abs() >= pair[1].response.abs());
    }
    for kp in &detection.keypoints {
        assert!(kp.refinement_steps >= 1 && kp.refinement_steps <= params.max_interpolation_steps);
        assert!(kp.level >= 1 && kp.level as usize <= params.levels_per_octave);
        assert!(kp.offset.0.abs() < 0.5 && kp.offset.1.abs() < 0.5 && kp.offset.2.abs() < 0.5);
        assert!(kp.response.abs() >= params.contrast_threshold / params.levels_per_octave as f32);
    }
    for d in &detection.descriptors {
        assert_eq!(d.features.len(), params.descriptor_len());
        assert!((0.0..TAU).contains(&d.orientation), "orientation {}", d.orientation);
        let norm = d.features.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm {norm}");
        assert!(d.features.iter().all(|&v| v >= 0.0));
    }
}

#[test]
fn detection_is_deterministic() {
    let image = BlobField::random(3, 120, -20.0, 140.0).render(120, 0.0, 1.0);
    let detector = SiftDetector::default();
    let first = detector.extract_luma(&image).unwrap();
    let second = detector.extract_luma(&image).unwrap();
    assert_eq!(first, second);
}
