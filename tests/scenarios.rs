mod common;

use common::{BLACK, DARK_GRAY, design, image, scene};
use design_fidelity::{
    ComparisonInputs, FidelityEngine,
    cancel::CancellationToken,
    detection::{Category, Severity, Signal},
    error::FidelityError,
    input::{ImageSource, layout::RegionSpec},
    iteration::IterationDecision,
    scoring::ScoreComponent,
};
use image::{
    Rgb, RgbImage,
    imageops::{self, FilterType},
};

fn compare(implementation: image::RgbImage, inputs: &ComparisonInputs) -> design_fidelity::Comparison {
    FidelityEngine::new()
        .unwrap()
        .compare_images(
            image(design(), "design"),
            image(implementation, "implementation"),
            inputs,
            &CancellationToken::new(),
        )
        .unwrap()
}

#[test]
fn identical_images_score_perfectly() {
    let comparison = compare(design(), &ComparisonInputs::default());

    assert_eq!(comparison.score.total, 100);
    assert!(comparison.discrepancies.is_empty());
    assert!((comparison.metrics.ssim - 1.0).abs() < 1e-9);
    assert_eq!(comparison.metrics.pixel_diff_percent, 0.0);
    assert_eq!(comparison.metrics.phash_distance, 0);
    assert!(comparison.metrics.color_delta_e.values().all(|&d| d == 0.0));
}

#[test]
fn recoloured_rectangle_only_costs_color() {
    let comparison = compare(scene(150, DARK_GRAY), &ComparisonInputs::default());

    assert!(!comparison.discrepancies.is_empty());
    assert!(comparison.discrepancies.iter().all(|d| d.category == Category::Color));

    let worst = &comparison.discrepancies[0];
    assert_eq!(worst.severity, Severity::High);
    assert_eq!(worst.region_label(), Some("auto-0"));
    assert!(worst.delta > 3.5);

    assert_eq!(comparison.score.breakdown[&ScoreComponent::Color], 0);
    assert_eq!(comparison.score.breakdown[&ScoreComponent::Ssim], 30);
    assert_eq!(comparison.score.breakdown[&ScoreComponent::PixelDiff], 20);
    assert_eq!(comparison.score.total, 80);
}

#[test]
fn shifted_rectangle_is_a_spacing_problem() {
    let comparison = compare(scene(170, BLACK), &ComparisonInputs::default());

    let offset = comparison
        .discrepancies
        .iter()
        .find(|d| d.signal == Signal::ContentOffset)
        .expect("content offset reported");
    assert_eq!(offset.category, Category::Spacing);
    assert_eq!(offset.delta, 20.0);
    assert_eq!(offset.severity, Severity::High);

    assert!(comparison.metrics.ssim < 0.9);
    assert!(comparison.metrics.pixel_diff_percent > 5.0);
    assert!(
        comparison
            .discrepancies
            .iter()
            .any(|d| d.category == Category::Structure && d.severity == Severity::High)
    );
    assert!(
        !comparison
            .discrepancies
            .iter()
            .any(|d| d.category == Category::Color)
    );
    assert_eq!(comparison.score.total, 35);
}

#[test]
fn comparisons_are_deterministic() {
    let a = compare(scene(163, DARK_GRAY), &ComparisonInputs::default());
    let b = compare(scene(163, DARK_GRAY), &ComparisonInputs::default());

    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.discrepancies, b.discrepancies);
    assert_eq!(a.score.total, b.score.total);
    assert_eq!(a.score.breakdown, b.score.breakdown);
}

#[test]
fn out_of_bounds_regions_are_skipped_not_fatal() {
    let inputs = ComparisonInputs {
        regions: Some(vec![
            RegionSpec::new("card", 140, 70, 120, 60),
            RegionSpec::new("ghost", 1000, 1000, 50, 50),
        ]),
        ..Default::default()
    };
    let comparison = compare(design(), &inputs);

    assert_eq!(comparison.metrics.regions.len(), 1);
    assert_eq!(comparison.metrics.regions[0].label, "card");

    let skipped = comparison
        .discrepancies
        .iter()
        .filter(|d| d.signal == Signal::RegionSkipped)
        .collect::<Vec<_>>();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].category, Category::Structure);
    assert_eq!(skipped[0].severity, Severity::Medium);
    assert!(skipped[0].description.contains("ghost"));
    assert_eq!(comparison.score.total, 100);
}

#[test]
fn mismatched_viewport_is_normalized_and_reported() {
    let large = imageops::resize(&design(), 800, 400, FilterType::Nearest);
    let inputs = ComparisonInputs {
        retain_images: true,
        ..Default::default()
    };
    let comparison = compare(large, &inputs);

    let pair = comparison.images.as_ref().expect("images retained");
    assert!(pair.was_resized());
    assert_eq!(pair.original_implementation_size, (800, 400));
    let first = &comparison.discrepancies[0];
    assert_eq!(first.signal, Signal::Dimensions);
    assert_eq!(first.severity, Severity::High);
    assert_eq!(comparison.score.breakdown[&ScoreComponent::Ssim], 0);
    assert!(comparison.score.total <= 70);
}

#[test]
fn wrong_viewport_never_converges() {
    let engine = FidelityEngine::new().unwrap();
    let blank = |width, height| image(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])), "blank");

    let comparison = engine
        .compare_images(
            blank(400, 200),
            blank(375, 812),
            &ComparisonInputs::default(),
            &CancellationToken::new(),
        )
        .unwrap();
    assert!(comparison.images.is_none());
    assert_eq!(comparison.metrics.pixel_diff_percent, 0.0);
    assert_eq!(comparison.score.total, 70);

    let mut controller = engine.controller().unwrap();
    let decision = controller
        .record(comparison.score.clone(), &comparison.discrepancies)
        .unwrap();
    let IterationDecision::Continue { ranked } = decision else {
        panic!("a resized screenshot must not converge, got {decision:?}");
    };
    assert_eq!(ranked[0].discrepancy.signal, Signal::Dimensions);
    assert_eq!(ranked[0].impact, 30.0);
}

#[test]
fn corrupt_input_fails_with_image_load() {
    let engine = FidelityEngine::new().unwrap();
    let result = engine.compare_sources(
        &ImageSource::bytes("design.png", b"not a png".to_vec()),
        &ImageSource::bytes("impl.png", Vec::new()),
        &ComparisonInputs::default(),
        &CancellationToken::new(),
    );

    assert!(matches!(result, Err(FidelityError::ImageLoad { .. })));
}
