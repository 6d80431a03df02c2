//! Sidecar file documenting the contract of a model artifact.
//!
//! The input size, tensor layout and normalization a model expects cannot be read
//! reliably from the artifact itself, so they travel with it as JSON:
//!
//! ```json
//! {
//!   "input": {
//!     "width": 64,
//!     "height": 64,
//!     "layout": "nhwc",
//!     "normalization": { "kind": "unit" },
//!     "filter": "catmull_rom"
//!   },
//!   "softmax": false,
//!   "labels": ["TRUCK", "BUS", "CAR", "MOTORCYCLE"]
//! }
//! ```
//!
//! Every field is optional, a missing field keeps the configured value.
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tensor::TensorLayout;

use super::{
    labels::{LabelError, LabelSet},
    prepare::{ChannelPolicy, Normalization, ResizeFilter},
    Config,
};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Could not read the manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("The manifest is not valid: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub layout: Option<TensorLayout>,
    pub normalization: Option<Normalization>,
    pub filter: Option<ResizeFilter>,
    pub channels: Option<ChannelPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default)]
    pub input: InputSpec,
    /// Whether the raw model output still needs a softmax
    pub softmax: Option<bool>,
    /// Class names in training order
    pub labels: Option<Vec<String>>,
}

impl ArtifactManifest {
    pub fn from_file<P>(path: P) -> Result<Self, ManifestError>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Overrides the fields of `config` that the manifest sets.
    pub fn apply(&self, config: &mut Config) {
        let input = &self.input;
        let prepare = &mut config.prepare;
        if let Some(width) = input.width {
            prepare.target_size.0 = width;
        }
        if let Some(height) = input.height {
            prepare.target_size.1 = height;
        }
        if let Some(layout) = input.layout {
            prepare.layout = layout;
        }
        if let Some(normalization) = input.normalization {
            prepare.normalization = normalization;
        }
        if let Some(filter) = input.filter {
            prepare.filter = filter;
        }
        if let Some(channels) = input.channels {
            prepare.channels = channels;
        }
        if let Some(softmax) = self.softmax {
            config.apply_softmax = softmax;
        }
    }

    pub fn label_set(&self) -> Option<Result<LabelSet, LabelError>> {
        self.labels.as_ref().map(|labels| LabelSet::new(labels.iter().cloned()))
    }
}
