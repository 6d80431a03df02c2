use std::str::FromStr;

use image::{imageops, DynamicImage, RgbImage};
use ndarray::{arr1, Array1, Array3, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tensor::{InputTensor, TensorLayout};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("The bytes are not a valid image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Images with color type {color} are not supported, a color image is required")]
    UnsupportedFormat { color: String },
    #[error("The target size {width}x{height} is invalid")]
    InvalidTargetSize { width: u32, height: u32 },
    #[error("The normalization has a standard deviation equal to zero")]
    InvalidNormalization,
}

/// How pixel intensities are scaled before reaching the model.
///
/// It has to match the scaling used at training time: a wrong choice does not fail,
/// it silently produces wrong predictions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Divide by 255, values in `[0, 1]`
    #[default]
    Unit,
    /// Keep the raw intensities, values in `[0, 255]`
    Raw,
    /// Divide by 255, then subtract the mean and divide by the standard deviation of each channel
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    pub fn imagenet() -> Self {
        Normalization::MeanStd {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Normalizes an image stored as `[height, width, channels]`.
    fn apply(&self, tensor: Array3<f32>) -> Array3<f32> {
        match self {
            Normalization::Unit => tensor.mapv(|x| x / 255.0),
            Normalization::Raw => tensor,
            // channels are the last axis, so the per-channel arrays broadcast directly
            Normalization::MeanStd { mean, std } => {
                (tensor.mapv(|x| x / 255.0) - &arr1(mean)) / &arr1(std)
            }
        }
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" => Ok(Self::Unit),
            "raw" => Ok(Self::Raw),
            "imagenet" => Ok(Self::imagenet()),
            _ => Err(format!("Invalid normalization: {}", s)),
        }
    }
}

/// Resampling filter of the resize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    /// Bicubic resampling
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => imageops::FilterType::Nearest,
            ResizeFilter::Triangle => imageops::FilterType::Triangle,
            ResizeFilter::CatmullRom => imageops::FilterType::CatmullRom,
            ResizeFilter::Gaussian => imageops::FilterType::Gaussian,
            ResizeFilter::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "nearest" => Ok(Self::Nearest),
            "triangle" | "bilinear" => Ok(Self::Triangle),
            "catmull_rom" | "bicubic" => Ok(Self::CatmullRom),
            "gaussian" => Ok(Self::Gaussian),
            "lanczos3" | "lanczos" => Ok(Self::Lanczos3),
            _ => Err(format!("Invalid resize filter: {}", s)),
        }
    }
}

/// What to do with images that carry no color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// Grayscale images are rejected with [`PrepareError::UnsupportedFormat`]
    #[default]
    RequireColor,
    /// Grayscale images are expanded to three identical channels
    ExpandGray,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareConfig {
    /// `(width, height)` of the model input
    pub target_size: (u32, u32),
    pub layout: TensorLayout,
    pub normalization: Normalization,
    pub filter: ResizeFilter,
    pub channels: ChannelPolicy,
}

impl Default for PrepareConfig {
    /// Input contract of the bundled vehicle model: 64x64 RGB, NHWC, scaled to `[0, 1]`.
    fn default() -> Self {
        Self {
            target_size: (64, 64),
            layout: TensorLayout::Nhwc,
            normalization: Normalization::Unit,
            filter: ResizeFilter::CatmullRom,
            channels: ChannelPolicy::RequireColor,
        }
    }
}

impl PrepareConfig {
    /// Shape of the tensors produced with this configuration.
    pub fn tensor_shape(&self) -> [usize; 4] {
        let (width, height) = self.target_size;
        self.layout.shape(width as usize, height as usize)
    }

    pub fn validate(&self) -> Result<(), PrepareError> {
        let (width, height) = self.target_size;
        if width == 0 || height == 0 {
            return Err(PrepareError::InvalidTargetSize { width, height });
        }
        if let Normalization::MeanStd { std, .. } = self.normalization {
            if std.iter().any(|&s| s == 0.0) {
                return Err(PrepareError::InvalidNormalization);
            }
        }
        Ok(())
    }
}

/// Decodes an encoded image and turns it into a model input.
///
/// The bytes are decoded first, so malformed input fails with [`PrepareError::Decode`]
/// before anything else is done.
pub fn preprocess(bytes: &[u8], config: &PrepareConfig) -> Result<InputTensor, PrepareError> {
    config.validate()?;
    let image = image::load_from_memory(bytes)?;
    preprocess_image(&image, config)
}

/// Preprocess an already decoded image.
///
/// The image is resized to the target size without preserving its aspect ratio,
/// normalized, laid out as requested and a batch dimension equal to 1 is added.
pub fn preprocess_image(
    image: &DynamicImage,
    config: &PrepareConfig,
) -> Result<InputTensor, PrepareError> {
    config.validate()?;
    let rgb = color_image(image, config.channels)?;

    let (width, height) = config.target_size;
    let resized = imageops::resize(&rgb, width, height, config.filter.into());

    let tensor = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32
    });
    let tensor = config.normalization.apply(tensor);

    let tensor = match config.layout {
        TensorLayout::Nhwc => tensor,
        //transpose the image from [h, w, 3] to [3, h, w]
        TensorLayout::Nchw => tensor.permuted_axes([2, 0, 1]),
    };
    let tensor = tensor
        .insert_axis(Axis(0))
        .as_standard_layout()
        .into_owned();

    Ok(InputTensor::new_unchecked(tensor, config.layout))
}

/// Postprocess the output of the model.
///
/// This will apply a softmax function to the scores.
pub fn postprocessing(scores: Array1<f32>) -> Array1<f32> {
    // shift by the maximum so that exp never overflows
    let max = scores.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let scores = scores.mapv(|x| (x - max).exp());
    let sum = scores.sum();
    scores / sum
}

fn color_image(image: &DynamicImage, policy: ChannelPolicy) -> Result<RgbImage, PrepareError> {
    let color = image.color();
    if !color.has_color() && policy == ChannelPolicy::RequireColor {
        return Err(PrepareError::UnsupportedFormat {
            color: format!("{:?}", color),
        });
    }
    // alpha is dropped, grayscale is replicated on the three channels
    Ok(image.to_rgb8())
}
