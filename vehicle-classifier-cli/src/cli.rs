use std::{path::PathBuf, str::FromStr};

use clap::Parser;

use strum::Display;
use vehicle_classifier::{service::prepare::Normalization, tensor::TensorLayout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path of the ONNX model artifact.
    /// Example: --model models/vehicle.onnx
    #[arg(short, long)]
    pub model: PathBuf,

    /// Input image path.
    /// Example: --input /path/to/image1.jpg --input /path/to/image2.png
    #[arg(short, long, required = true)]
    pub input: Vec<PathBuf>,

    /// Plain text file with one label per line, in the order of the model outputs.
    /// Default: TRUCK, BUS, CAR, MOTORCYCLE
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// JSON manifest describing the input contract of the model.
    /// Explicit options on the command line take precedence over it.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Width of the model input. Default: 64
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,

    /// Height of the model input. Default: 64
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,

    /// Tensor layout of the model input.
    /// Supported layouts: nhwc, nchw
    /// Default: nhwc
    #[arg(long)]
    pub layout: Option<TensorLayout>,

    /// Normalization of the pixel values.
    /// Supported normalizations: unit ([0, 1]), raw ([0, 255]), imagenet
    /// Default: unit
    #[arg(long)]
    pub normalization: Option<Normalization>,

    /// Apply a softmax to the model output, for models ending with raw logits.
    /// `--softmax false` turns off a softmax requested by the manifest.
    /// Example: --softmax or --softmax false
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub softmax: Option<bool>,

    /// Minimum score of the best class for it to be reported.
    /// Example: --min-confidence 0.5
    #[arg(long)]
    pub min_confidence: Option<f32>,

    /// Maximum duration of one inference in milliseconds, 0 disables the limit.
    #[arg(long, default_value = "10000")]
    pub timeout_ms: u64,

    /// Number of threads running the inferences. Must be greater than 0 and less than 65536.
    /// Example: --threads 2
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Number of top classes to show for every image, 0 shows only the predicted label.
    /// Example: --show 4
    #[arg(short, long, default_value = "0")]
    pub show: usize,

    /// Output format.
    /// Supported formats: text, json
    /// Default: text
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OutputFormat {
    #[strum(serialize = "text")]
    Text,
    #[strum(serialize = "json")]
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ if s.starts_with('t') => Ok(Self::Text),
            _ if s.starts_with('j') => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}
