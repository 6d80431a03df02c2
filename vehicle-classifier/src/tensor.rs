//! # Tensor utilities
//!
//! The preprocessed image handed to a [`Provider`](crate::providers::Provider).
//!
//! The data is always a four dimensional `f32` array whose first axis is the batch
//! dimension, fixed to 1. The position of the channel axis depends on the [`TensorLayout`].
use std::{fmt, str::FromStr};

use ndarray::{Array4, ArrayView4};
use serde::{Deserialize, Serialize};

/// Order of the axes of an image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`, the Keras/TensorFlow default
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]`, the PyTorch default
    Nchw,
}

impl TensorLayout {
    /// Shape of a single RGB image with the given size in this layout.
    pub fn shape(&self, width: usize, height: usize) -> [usize; 4] {
        match self {
            TensorLayout::Nhwc => [1, height, width, 3],
            TensorLayout::Nchw => [1, 3, height, width],
        }
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorLayout::Nhwc => write!(f, "nhwc"),
            TensorLayout::Nchw => write!(f, "nchw"),
        }
    }
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(Self::Nhwc),
            "nchw" => Ok(Self::Nchw),
            _ => Err(format!("Invalid tensor layout: {}", s)),
        }
    }
}

/// One preprocessed image with a leading batch dimension equal to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array4<f32>,
    layout: TensorLayout,
}

impl InputTensor {
    /// Wraps an already laid out array.
    ///
    /// Returns `None` if the batch dimension is not 1 or the channel axis does not hold 3 channels.
    pub fn new(data: Array4<f32>, layout: TensorLayout) -> Option<Self> {
        let shape = data.shape();
        let channels = match layout {
            TensorLayout::Nhwc => shape[3],
            TensorLayout::Nchw => shape[1],
        };
        if shape[0] != 1 || channels != 3 {
            return None;
        }
        Some(Self { data, layout })
    }

    /// Wraps an array without checking the batch and channel axes.
    ///
    /// Used to hand deliberately malformed tensors to a provider, a provider must not
    /// assume the channel count of what it receives.
    pub fn new_unchecked(data: Array4<f32>, layout: TensorLayout) -> Self {
        Self { data, layout }
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Contiguous row-major copy of the values, in the order given by [`InputTensor::shape`].
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Smallest and largest value of the tensor.
    pub fn value_range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            })
    }
}
