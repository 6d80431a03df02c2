mod tract;

pub use tract::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::tensor::InputTensor;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("The model artifact {0} does not exist")]
    Missing(PathBuf),
    #[error("The model artifact {path} is invalid: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },
    #[error("The forward pass failed: {0}")]
    Execution(String),
    #[error("The model output has shape {0:?}, expected a single score vector")]
    UnexpectedOutput(Vec<usize>),
}

/// A trait that has to be implemented by all the inference providers.
///
/// A provider owns a loaded model artifact and runs forward passes on it.
/// It is shared by every request of a [`Service`](crate::service::Service), so
/// [`Provider::run`] must be reentrant: it takes `&self` and keeps no state
/// between two calls.
pub trait Provider: Send + Sync {
    /// Returns the name of the provider, used in logs.
    fn name(&self) -> &str;

    /// Shape of the input tensor the model was loaded with, batch dimension included.
    ///
    /// `None` means the provider accepts any shape and reports mismatches from [`Provider::run`].
    fn input_shape(&self) -> Option<Vec<usize>>;

    /// Number of scores produced by one forward pass, if known before running the model.
    fn output_len(&self) -> Option<usize>;

    /// Runs one forward pass and returns the flattened score vector.
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>, ProviderError>;
}
