use std::path::Path;

use tract_onnx::prelude::*;

use crate::tensor::InputTensor;

use super::{Provider, ProviderError};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Runs an ONNX artifact with the `tract` inference engine.
///
/// The model is parsed, typed with a fixed input shape and optimized once in
/// [`TractProvider::load`]; every call to [`Provider::run`] reuses the same plan.
pub struct TractProvider {
    plan: Plan,
    input_shape: Vec<usize>,
    output_len: Option<usize>,
}

impl TractProvider {
    /// Loads the artifact at `path`, pinning its first input to `input_shape`.
    ///
    /// Fails if the file does not exist, is not an ONNX model, or cannot be typed with
    /// the given input shape (e.g. the artifact was exported for another image size).
    pub fn load<P>(path: P, input_shape: [usize; 4]) -> Result<Self, ProviderError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ProviderError::Missing(path.to_path_buf()));
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape).into()))
            .and_then(|model| model.into_optimized())
            .map_err(|e| invalid_artifact(path, e))?;

        let output_len = model
            .output_fact(0)
            .map_err(|e| invalid_artifact(path, e))?
            .shape
            .as_concrete()
            .map(|shape| shape.iter().product::<usize>());

        let plan = model
            .into_runnable()
            .map_err(|e| invalid_artifact(path, e))?;

        log::debug!(
            "Loaded {} with input {:?} and {:?} outputs",
            path.display(),
            input_shape,
            output_len
        );

        Ok(Self {
            plan,
            input_shape: input_shape.to_vec(),
            output_len,
        })
    }
}

impl Provider for TractProvider {
    fn name(&self) -> &str {
        "tract-onnx"
    }

    fn input_shape(&self) -> Option<Vec<usize>> {
        Some(self.input_shape.clone())
    }

    fn output_len(&self) -> Option<usize> {
        self.output_len
    }

    fn run(&self, input: &InputTensor) -> Result<Vec<f32>, ProviderError> {
        let tensor = Tensor::from_shape(input.shape(), &input.to_vec()).map_err(execution_error)?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(execution_error)?;

        let output = outputs
            .first()
            .ok_or(ProviderError::UnexpectedOutput(vec![]))?;

        // [1, classes] and [classes] are both fine, anything with a second non-unit axis is not
        let shape = output.shape();
        if shape.iter().filter(|&&dim| dim != 1).count() > 1 {
            return Err(ProviderError::UnexpectedOutput(shape.to_vec()));
        }

        let scores = output.as_slice::<f32>().map_err(execution_error)?;
        Ok(scores.to_vec())
    }
}

fn invalid_artifact(path: &Path, error: TractError) -> ProviderError {
    ProviderError::InvalidArtifact {
        path: path.to_path_buf(),
        reason: format!("{:#}", error),
    }
}

fn execution_error(error: TractError) -> ProviderError {
    ProviderError::Execution(format!("{:#}", error))
}
