use criterion::{black_box, criterion_group, Criterion};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use lazy_static::lazy_static;
use std::{io::Cursor, time::Duration};
use vehicle_classifier::{
    providers::{Provider, ProviderError},
    service::{labels::LabelSet, Config, Service},
    tensor::InputTensor,
};

struct ConstantProvider;

impl Provider for ConstantProvider {
    fn name(&self) -> &str {
        "constant"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        Some(vec![1, 64, 64, 3])
    }

    fn output_len(&self) -> Option<usize> {
        Some(4)
    }

    fn run(&self, _input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![0.7, 0.1, 0.1, 0.1])
    }
}

lazy_static! {
    static ref UPLOAD: Vec<u8> = {
        let image = RgbImage::from_fn(500, 300, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageOutputFormat::Jpeg(90))
            .expect("Unable to encode the fixture");
        bytes.into_inner()
    };
}

fn service(inference_timeout: Option<Duration>) -> Service<ConstantProvider> {
    let config = Config {
        inference_timeout,
        ..Default::default()
    };
    Service::from_provider(ConstantProvider, LabelSet::vehicles(), config)
        .expect("Unable to create the service")
}

/// Measures the overhead of the service around the model.
fn bench_classify(c: &mut Criterion) {
    let unbounded = service(None);
    let bounded = service(Some(Duration::from_secs(10)));

    let mut group = c.benchmark_group("Pipeline");
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("classify without timeout", |b| {
        b.iter(|| unbounded.classify_image(black_box(&UPLOAD)))
    });
    group.bench_function("classify with timeout", |b| {
        b.iter(|| bounded.classify_image(black_box(&UPLOAD)))
    });
    group.finish();
}

criterion_group!(pipeline, bench_classify);
