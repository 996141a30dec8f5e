use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use morphview::classifier::ClassificationHead;
use morphview::{preprocess, ProbabilityVector, NUM_LABELS};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 256) as u8])
    }))
}

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preprocess");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    // microscope crops come in a range of sizes
    for (name, width, height) in [("small", 128, 96), ("native", 224, 224), ("large", 1280, 960)] {
        let image = sample_image(width, height);
        group.bench_function(name, |b| b.iter(|| preprocess(black_box(&image))));
    }

    group.finish();
}

fn bench_head(c: &mut Criterion) {
    let mut group = c.benchmark_group("Head");
    let mut rng = StdRng::seed_from_u64(0);

    for in_features in [768, 1536] {
        let head = ClassificationHead::initialized(NUM_LABELS, in_features, &mut rng);
        let features = Array2::from_elem((1, in_features), 0.5f32);
        group.bench_function(format!("forward_{}", in_features), |b| {
            b.iter(|| head.forward(black_box(features.view())))
        });
    }

    let logits = Array1::linspace(-4.0f32, 4.0, NUM_LABELS);
    group.bench_function("softmax", |b| {
        b.iter(|| ProbabilityVector::from_logits(black_box(logits.view())))
    });

    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_head);
criterion_main!(benches);
