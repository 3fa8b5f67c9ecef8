use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use design_fidelity::{
    analysis::{
        MetricConfig,
        metrics::MetricEngine,
        segmentation::RegionSegmenter,
    },
    cancel::CancellationToken,
    input::{Image, loader::ImageLoader},
};
use image::{Rgb, RgbImage};

fn scene(width: u32, height: u32, shift: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let in_card = (x >= width / 4 + shift && x < width / 2 + shift) && (y >= height / 3 && y < height / 2);
        let in_bar = y < height / 10;
        if in_card || in_bar { Rgb([20, 20, 20]) } else { Rgb([250, 250, 250]) }
    })
}

fn bench_compare_regions(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_regions");

    for (width, height) in [(400, 200), (1280, 720)] {
        let pair = ImageLoader::normalize(
            Image::from_rgb(scene(width, height, 0), "design").unwrap(),
            Image::from_rgb(scene(width, height, 12), "implementation").unwrap(),
        );
        let segmentation = RegionSegmenter::new()
            .segment(&pair, None, None, &CancellationToken::new())
            .unwrap();

        for parallel in [false, true] {
            let engine = MetricEngine::with_config(MetricConfig {
                parallel,
                ..Default::default()
            });
            let id = BenchmarkId::new(if parallel { "parallel" } else { "sequential" }, format!("{width}x{height}"));

            group.bench_with_input(id, &pair, |bench, pair| {
                bench.iter(|| black_box(engine.compare_regions(pair, &segmentation).unwrap()));
            });
        }
    }

    group.finish();
}

fn bench_segmentation(c: &mut Criterion) {
    let pair = ImageLoader::normalize(
        Image::from_rgb(scene(1280, 720, 0), "design").unwrap(),
        Image::from_rgb(scene(1280, 720, 12), "implementation").unwrap(),
    );
    let segmenter = RegionSegmenter::new();
    let cancel = CancellationToken::new();

    c.bench_function("auto_segment_1280x720", |bench| {
        bench.iter(|| black_box(segmenter.segment(&pair, None, None, &cancel).unwrap()));
    });
}

criterion_group!(benches, bench_compare_regions, bench_segmentation);
criterion_main!(benches);
