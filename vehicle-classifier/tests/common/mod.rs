#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use std::{
    io::Cursor,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use vehicle_classifier::{
    providers::{Provider, ProviderError},
    tensor::InputTensor,
};

/// Always answers with the same scores.
pub struct FixedProvider {
    pub scores: Vec<f32>,
    pub input_shape: Option<Vec<usize>>,
    pub calls: AtomicUsize,
}

impl FixedProvider {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            input_shape: Some(vec![1, 64, 64, 3]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        self.input_shape.clone()
    }

    fn output_len(&self) -> Option<usize> {
        Some(self.scores.len())
    }

    fn run(&self, _input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }
}

/// Scores the mean of each channel, so different images get different answers.
pub struct ChannelMeanProvider;

impl Provider for ChannelMeanProvider {
    fn name(&self) -> &str {
        "channel-mean"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        Some(vec![1, 64, 64, 3])
    }

    fn output_len(&self) -> Option<usize> {
        Some(4)
    }

    fn run(&self, input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        let view = input.view();
        let mut scores = vec![0.0; 4];
        for (c, score) in scores.iter_mut().take(3).enumerate() {
            *score = view.index_axis(ndarray::Axis(3), c).mean().unwrap_or(0.0);
        }
        Ok(scores)
    }
}

/// Fails every call with an execution error.
pub struct FailingProvider;

impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        None
    }

    fn output_len(&self) -> Option<usize> {
        None
    }

    fn run(&self, _input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Execution(String::from("device lost")))
    }
}

/// Sleeps before answering.
pub struct SlowProvider {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        None
    }

    fn output_len(&self) -> Option<usize> {
        Some(4)
    }

    fn run(&self, _input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(vec![0.1, 0.2, 0.6, 0.1])
    }
}

/// Sleeps on its first call only, later calls answer at once.
pub struct SlowFirstProvider {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowFirstProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Provider for SlowFirstProvider {
    fn name(&self) -> &str {
        "slow-first"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        None
    }

    fn output_len(&self) -> Option<usize> {
        Some(4)
    }

    fn run(&self, _input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(self.delay);
        }
        Ok(vec![0.1, 0.7, 0.1, 0.1])
    }
}

/// Panics inside the worker.
pub struct PanickingProvider;

impl Provider for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        None
    }

    fn output_len(&self) -> Option<usize> {
        None
    }

    fn run(&self, _input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        panic!("inference worker crashed")
    }
}

pub fn encode(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

pub fn rgb_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    encode(DynamicImage::ImageRgb8(image), ImageOutputFormat::Png)
}

pub fn rgb_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            color[0].wrapping_add((x % 7) as u8),
            color[1].wrapping_add((y % 5) as u8),
            color[2],
        ])
    });
    encode(DynamicImage::ImageRgb8(image), ImageOutputFormat::Jpeg(90))
}

pub fn gray_png(width: u32, height: u32) -> Vec<u8> {
    let image = GrayImage::from_pixel(width, height, Luma([128]));
    encode(DynamicImage::ImageLuma8(image), ImageOutputFormat::Png)
}
