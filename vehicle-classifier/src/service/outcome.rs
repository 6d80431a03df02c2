//! Result of one classification request, as shown to the user.
//!
//! Every request ends in exactly one of three states: a label was found, the model ran
//! but its answer maps to no usable label, or the pipeline failed. Raw class indices are
//! never part of an outcome.
use std::fmt;

use super::{prepare::PrepareError, InferenceError};

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Score of the selected class
    pub confidence: f32,
    /// Distance between the selected score and the runner-up
    pub margin: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecognizedReason {
    /// The top index has no entry in the label set
    OutOfRange,
    /// The top score is below the configured minimum confidence
    LowConfidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unrecognized {
    pub reason: UnrecognizedReason,
    pub confidence: f32,
}

#[derive(Debug)]
pub enum Failure {
    /// The upload could not be decoded as an image
    InvalidImage(PrepareError),
    /// The upload is an image, but its channel layout cannot be fed to the model
    UnsupportedImage(PrepareError),
    /// Inference failed at runtime
    CouldNotClassify(InferenceError),
}

impl From<PrepareError> for Failure {
    fn from(error: PrepareError) -> Self {
        match error {
            PrepareError::UnsupportedFormat { .. } => Failure::UnsupportedImage(error),
            // configuration errors are caught when the service is built
            _ => Failure::InvalidImage(error),
        }
    }
}

impl From<InferenceError> for Failure {
    fn from(error: InferenceError) -> Self {
        Failure::CouldNotClassify(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::InvalidImage(_) => write!(f, "invalid image"),
            Failure::UnsupportedImage(_) => write!(f, "unsupported image"),
            Failure::CouldNotClassify(_) => write!(f, "could not classify"),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Labeled(Prediction),
    Unrecognized(Unrecognized),
    Failed(Failure),
}

impl Outcome {
    pub fn label(&self) -> Option<&str> {
        match self {
            Outcome::Labeled(prediction) => Some(&prediction.label),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Outcome::Labeled(prediction) => Some(prediction.confidence),
            Outcome::Unrecognized(unrecognized) => Some(unrecognized.confidence),
            Outcome::Failed(_) => None,
        }
    }

    /// Stable machine readable name of the terminal state.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Labeled(_) => "labeled",
            Outcome::Unrecognized(_) => "unrecognized",
            Outcome::Failed(Failure::InvalidImage(_)) => "invalid_image",
            Outcome::Failed(Failure::UnsupportedImage(_)) => "unsupported_image",
            Outcome::Failed(Failure::CouldNotClassify(_)) => "could_not_classify",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Labeled(prediction) => {
                write!(f, "Predicted Vehicle Type: {}", prediction.label)
            }
            Outcome::Unrecognized(_) => write!(f, "Unable to recognize the vehicle type"),
            Outcome::Failed(failure) => write!(f, "Error: {}", failure),
        }
    }
}
