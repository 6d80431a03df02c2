//! Contains the service that classifies vehicle images.
//!
//! The service is created using a [`ServiceBuilder`], which loads the label set and the
//! model artifact once. A service around any other [`Provider`] can be created with
//! [`Service::from_provider`].
//!
//! [`Service::classify_image`] runs the whole pipeline on the bytes of an upload and
//! always returns an [`Outcome`]. The single steps are available as well:
//! [`Service::preprocess`], [`Service::infer`] and [`Service::label_output`].

pub mod breaker;
pub mod labels;
pub mod manifest;
pub mod outcome;
pub mod prepare;
pub mod shared;

use ndarray::{Array1, ArrayView1};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    path::PathBuf,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;

use crate::{
    providers::{Provider, ProviderError, TractProvider},
    tensor::InputTensor,
};

use self::{
    breaker::{BreakerConfig, BreakerState, CircuitBreaker},
    labels::{LabelError, LabelSet},
    manifest::{ArtifactManifest, ManifestError},
    outcome::{Failure, Outcome, Prediction, Unrecognized, UnrecognizedReason},
    prepare::{postprocessing, PrepareConfig, PrepareError},
};

/// Errors raised while building a service. None of them can happen once a service exists.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("The model could not be loaded: {0}")]
    ModelLoad(#[from] ProviderError),
    #[error("The model produces {outputs} scores but the label set has {labels} labels")]
    IncompatibleModel { outputs: usize, labels: usize },
    #[error("The model expects an input of shape {expected:?}, the preprocessing produces {actual:?}")]
    IncompatibleInput {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("The label set could not be loaded: {0}")]
    Labels(#[from] LabelError),
    #[error("The model manifest could not be loaded: {0}")]
    Manifest(#[from] ManifestError),
    #[error("The configuration is invalid: {0}")]
    InvalidConfig(String),
}

/// Errors of a single inference call.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("The input shape {actual:?} is different than expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("The provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("The model returned no scores")]
    EmptyOutput,
    #[error("The model returned a non finite score at index {0}")]
    NonFiniteScore(usize),
    #[error("The inference did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Inference is suspended after repeated timeouts, retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },
    #[error("The inference worker stopped without an answer")]
    WorkerLost,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Workers of the pool running the forward passes
    pub num_threads: usize,
    pub prepare: PrepareConfig,
    /// Apply a softmax to the raw model output
    pub apply_softmax: bool,
    /// Minimum top score for a label to be reported
    pub min_confidence: Option<f32>,
    /// Upper bound of one forward pass once a worker runs it, `None` waits without bound
    pub inference_timeout: Option<Duration>,
    pub breaker: BreakerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: 1,
            prepare: PrepareConfig::default(),
            apply_softmax: false,
            min_confidence: None,
            inference_timeout: Some(Duration::from_secs(10)),
            breaker: BreakerConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.num_threads == 0 {
            return Err(ServiceError::InvalidConfig(String::from(
                "the number of threads must be greater than 0",
            )));
        }
        self.prepare
            .validate()
            .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;
        if let Some(min_confidence) = self.min_confidence {
            if !min_confidence.is_finite() || min_confidence < 0.0 {
                return Err(ServiceError::InvalidConfig(format!(
                    "invalid minimum confidence {}",
                    min_confidence
                )));
            }
        }
        if self.inference_timeout == Some(Duration::ZERO) {
            return Err(ServiceError::InvalidConfig(String::from(
                "the inference timeout must be greater than 0",
            )));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ServiceError::InvalidConfig(String::from(
                "the breaker failure threshold must be greater than 0",
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum LabelSource {
    Default,
    Set(LabelSet),
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct ServiceBuilder {
    model_path: PathBuf,
    manifest_path: Option<PathBuf>,
    labels: LabelSource,
    config: Config,
}

impl ServiceBuilder {
    pub fn new(model_path: PathBuf) -> Self {
        Self {
            model_path,
            manifest_path: None,
            labels: LabelSource::Default,
            config: Config::default(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn labels(mut self, labels: LabelSet) -> Self {
        self.labels = LabelSource::Set(labels);
        self
    }

    /// Reads the labels from a file with one label per line when building.
    pub fn labels_file(mut self, path: PathBuf) -> Self {
        self.labels = LabelSource::File(path);
        self
    }

    /// Reads the artifact manifest when building.
    ///
    /// The manifest overrides the preprocessing of the configuration. Its labels are
    /// used unless labels were set explicitly on the builder.
    pub fn manifest(mut self, path: PathBuf) -> Self {
        self.manifest_path = Some(path);
        self
    }

    pub fn build(self) -> Result<Service, ServiceError> {
        let mut config = self.config;
        let mut manifest_labels = None;
        if let Some(path) = &self.manifest_path {
            log::info!("Reading manifest {}", path.display());
            let manifest = ArtifactManifest::from_file(path)?;
            manifest.apply(&mut config);
            manifest_labels = manifest.label_set().transpose()?;
        }
        config.validate()?;

        let labels = match self.labels {
            LabelSource::Set(labels) => labels,
            LabelSource::File(path) => LabelSet::from_file(path)?,
            LabelSource::Default => manifest_labels.unwrap_or_default(),
        };

        log::info!("Loading model {}", self.model_path.display());
        let provider = TractProvider::load(&self.model_path, config.prepare.tensor_shape())?;
        Service::from_provider(provider, labels, config)
    }
}

/// Scores of one forward pass.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceOutput {
    scores: Array1<f32>,
}

/// One entry of a ranking, `label` is `None` for an index outside the label set.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedLabel {
    pub label: Option<String>,
    pub score: f32,
}

impl InferenceOutput {
    /// Validates the raw scores of a provider and applies the softmax if requested.
    pub fn new(scores: Vec<f32>, apply_softmax: bool) -> Result<Self, InferenceError> {
        if scores.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        if let Some(index) = scores.iter().position(|score| !score.is_finite()) {
            return Err(InferenceError::NonFiniteScore(index));
        }

        let scores = Array1::from(scores);
        let scores = if apply_softmax {
            postprocessing(scores)
        } else {
            scores
        };
        Ok(Self { scores })
    }

    pub fn scores(&self) -> ArrayView1<'_, f32> {
        self.scores.view()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Index and score of the best class.
    ///
    /// Ties are broken by the first occurrence in index order.
    pub fn top1(&self) -> (usize, f32) {
        self.scores
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &score)| {
                if score > best.1 {
                    (i, score)
                } else {
                    best
                }
            })
    }

    /// Difference between the best score and the second best one.
    pub fn margin(&self) -> f32 {
        match self.top_k(2).as_slice() {
            [(_, first), (_, second)] => first - second,
            [(_, first)] => *first,
            _ => 0.0,
        }
    }

    /// The `k` best classes by descending score, ties ordered by index.
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut top_k_classes = self
            .scores
            .iter()
            .enumerate()
            .map(|(i, &x)| (i, x))
            .collect::<Vec<_>>();
        top_k_classes.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        top_k_classes.truncate(k);
        top_k_classes
    }
}

pub struct Service<P = TractProvider> {
    provider: Arc<P>,
    labels: LabelSet,
    config: Config,
    thread_pool: ThreadPool,
    breaker: CircuitBreaker,
}

impl<P> Service<P>
where
    P: Provider + 'static,
{
    /// Creates a service around an already loaded provider.
    ///
    /// Fails if the configuration is invalid or if what the provider declares about its
    /// input and output does not fit the configuration and the label set.
    pub fn from_provider(
        provider: P,
        labels: LabelSet,
        config: Config,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        if let Some(expected) = provider.input_shape() {
            let actual = config.prepare.tensor_shape().to_vec();
            if expected != actual {
                return Err(ServiceError::IncompatibleInput { expected, actual });
            }
        }

        if let Some(outputs) = provider.output_len() {
            if outputs < labels.len() {
                return Err(ServiceError::IncompatibleModel {
                    outputs,
                    labels: labels.len(),
                });
            }
            if outputs > labels.len() {
                log::warn!(
                    "The model produces {} scores for {} labels, the extra classes will be reported as unrecognized",
                    outputs,
                    labels.len()
                );
            }
        }

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("inference-{}", i))
            .panic_handler(|_| log::error!("An inference worker panicked"))
            .build()
            .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;

        log::info!(
            "Service ready with provider {} and labels {:?}",
            provider.name(),
            labels.to_vec()
        );

        Ok(Self {
            provider: Arc::new(provider),
            labels,
            breaker: CircuitBreaker::new(config.breaker),
            config,
            thread_pool,
        })
    }

    pub fn current_config(&self) -> Config {
        self.config.clone()
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Preprocesses the bytes of an uploaded image with the configuration of the service.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<InputTensor, PrepareError> {
        prepare::preprocess(bytes, &self.config.prepare)
    }

    /// Runs the model on a preprocessed image.
    pub fn infer(&self, tensor: InputTensor) -> Result<InferenceOutput, InferenceError> {
        if let Some(expected) = self.provider.input_shape() {
            if tensor.shape() != expected.as_slice() {
                return Err(InferenceError::ShapeMismatch {
                    expected,
                    actual: tensor.shape().to_vec(),
                });
            }
        }

        self.breaker
            .acquire()
            .map_err(|retry_in| InferenceError::CircuitOpen { retry_in })?;

        let scores = self.run_on_pool(tensor, self.config.inference_timeout)?;

        InferenceOutput::new(scores, self.config.apply_softmax)
    }

    /// Maps the best class of an inference output to its label.
    pub fn label_output(&self, output: &InferenceOutput) -> Outcome {
        let (index, confidence) = output.top1();

        let Some(label) = self.labels.get(index) else {
            log::debug!("Top index {} is outside the label set", index);
            return Outcome::Unrecognized(Unrecognized {
                reason: UnrecognizedReason::OutOfRange,
                confidence,
            });
        };

        if let Some(min_confidence) = self.config.min_confidence {
            if confidence < min_confidence {
                return Outcome::Unrecognized(Unrecognized {
                    reason: UnrecognizedReason::LowConfidence,
                    confidence,
                });
            }
        }

        Outcome::Labeled(Prediction {
            label: label.to_string(),
            confidence,
            margin: output.margin(),
        })
    }

    /// Ranks the `k` best classes of an inference output.
    pub fn rank(&self, output: &InferenceOutput, k: usize) -> Vec<RankedLabel> {
        output
            .top_k(k)
            .into_iter()
            .map(|(i, score)| RankedLabel {
                label: self.labels.get(i).map(String::from),
                score,
            })
            .collect()
    }

    /// Classifies a preprocessed image. Inference errors become a failed outcome.
    pub fn classify(&self, tensor: InputTensor) -> Outcome {
        match self.infer(tensor) {
            Ok(output) => self.label_output(&output),
            Err(e) => {
                log::warn!("Could not classify the image: {}", e);
                Outcome::Failed(Failure::from(e))
            }
        }
    }

    /// Runs the whole pipeline on the bytes of an uploaded image.
    ///
    /// Images that cannot be preprocessed never reach the model.
    pub fn classify_image(&self, bytes: &[u8]) -> Outcome {
        match self.preprocess(bytes) {
            Ok(tensor) => self.classify(tensor),
            Err(e) => {
                log::info!("Rejected upload: {}", e);
                Outcome::Failed(Failure::from(e))
            }
        }
    }

    /// Runs one forward pass on the pool and waits for its answer.
    ///
    /// The deadline starts when a worker picks up the job, so time spent waiting behind
    /// a slow job is not counted against this one. A worker that panics is reported as
    /// [`InferenceError::WorkerLost`].
    fn run_on_pool(
        &self,
        tensor: InputTensor,
        timeout: Option<Duration>,
    ) -> Result<Vec<f32>, InferenceError> {
        let (started_sender, started) = mpsc::channel();
        let (sender, receiver) = mpsc::channel();
        let provider = Arc::clone(&self.provider);
        self.thread_pool.spawn(move || {
            let _ = started_sender.send(());
            // the receiver is gone if the caller already timed out
            let _ = sender.send(provider.run(&tensor));
        });

        if started.recv().is_err() {
            self.breaker.record_failure();
            return Err(InferenceError::WorkerLost);
        }

        let answer = match timeout {
            Some(timeout) => receiver.recv_timeout(timeout),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match answer {
            Ok(result) => {
                self.breaker.record_success();
                Ok(result?)
            }
            Err(RecvTimeoutError::Timeout) => {
                let timeout = timeout.unwrap_or_default();
                log::warn!("Inference timed out after {:?}", timeout);
                self.breaker.record_failure();
                Err(InferenceError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.breaker.record_failure();
                Err(InferenceError::WorkerLost)
            }
        }
    }
}
