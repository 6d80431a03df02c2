use criterion::{black_box, criterion_group, BenchmarkId, Criterion};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use lazy_static::lazy_static;
use std::io::Cursor;
use vehicle_classifier::{
    service::prepare::{preprocess, Normalization, PrepareConfig, ResizeFilter},
    tensor::TensorLayout,
};

lazy_static! {
    static ref PHOTO_JPEG: Vec<u8> = encode(1280, 720, ImageOutputFormat::Jpeg(85));
    static ref UPLOAD_PNG: Vec<u8> = encode(500, 300, ImageOutputFormat::Png);
}

fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut bytes, format)
        .expect("Unable to encode the fixture");
    bytes.into_inner()
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preprocess filters");
    for filter in [
        ResizeFilter::Nearest,
        ResizeFilter::Triangle,
        ResizeFilter::CatmullRom,
        ResizeFilter::Lanczos3,
    ] {
        let config = PrepareConfig {
            filter,
            ..Default::default()
        };
        group.bench_with_input(
            BenchmarkId::new("jpeg 1280x720", format!("{:?}", filter)),
            &config,
            |b, config| b.iter(|| preprocess(black_box(&PHOTO_JPEG), config).unwrap()),
        );
    }
    group.finish();
}

fn bench_layouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preprocess layouts");
    let nhwc = PrepareConfig::default();
    let nchw = PrepareConfig {
        target_size: (224, 224),
        layout: TensorLayout::Nchw,
        normalization: Normalization::imagenet(),
        ..Default::default()
    };
    group.bench_function("png 64x64 nhwc unit", |b| {
        b.iter(|| preprocess(black_box(&UPLOAD_PNG), &nhwc).unwrap())
    });
    group.bench_function("png 224x224 nchw imagenet", |b| {
        b.iter(|| preprocess(black_box(&UPLOAD_PNG), &nchw).unwrap())
    });
    group.finish();
}

criterion_group!(preprocessing, bench_filters, bench_layouts);
