use pyo3::{exceptions::PyValueError, prelude::*};
use std::path::PathBuf;
use vehicle_classifier::service::{
    outcome::Outcome, Config, Service, ServiceBuilder, ServiceError,
};

#[pyclass(name = "Classifier")]
struct PyClassifier {
    service: Service,
}

#[pyclass(name = "Outcome")]
pub struct PyOutcome {
    /// labeled, unrecognized, invalid_image, unsupported_image or could_not_classify
    #[pyo3(get)]
    pub kind: String,
    #[pyo3(get)]
    pub label: Option<String>,
    #[pyo3(get)]
    pub confidence: Option<f32>,
    /// Message to show to the user
    #[pyo3(get)]
    pub message: String,
}

impl From<Outcome> for PyOutcome {
    fn from(value: Outcome) -> Self {
        Self {
            kind: value.kind().to_string(),
            label: value.label().map(String::from),
            confidence: value.confidence(),
            message: value.to_string(),
        }
    }
}

#[pymethods]
impl PyOutcome {
    fn __repr__(&self) -> String {
        match (&self.label, self.confidence) {
            (Some(label), Some(confidence)) => {
                format!("Outcome({}, {}, {:.2}%)", self.kind, label, confidence * 100f32)
            }
            _ => format!("Outcome({})", self.kind),
        }
    }
    pub fn __str__(&self) -> String {
        self.message.clone()
    }
}

#[pymethods]
impl PyClassifier {
    /// Classifies the bytes of an uploaded image. Never raises for a bad upload.
    pub fn classify(&self, py: Python<'_>, image: &[u8]) -> PyOutcome {
        // the model runs without holding the GIL
        py.allow_threads(|| self.service.classify_image(image)).into()
    }

    pub fn labels(&self) -> Vec<String> {
        self.service.labels().to_vec()
    }
}

fn to_py_err(err: ServiceError) -> PyErr {
    PyErr::new::<PyValueError, _>(err.to_string())
}

#[pyfunction]
#[pyo3(signature = (model_path, labels_path=None, manifest_path=None, num_threads=1))]
fn build_classifier(
    model_path: PathBuf,
    labels_path: Option<PathBuf>,
    manifest_path: Option<PathBuf>,
    num_threads: usize,
) -> PyResult<PyClassifier> {
    let mut builder = ServiceBuilder::new(model_path).config(Config {
        num_threads,
        ..Default::default()
    });
    if let Some(path) = labels_path {
        builder = builder.labels_file(path);
    }
    if let Some(path) = manifest_path {
        builder = builder.manifest(path);
    }
    let service = builder.build().map_err(to_py_err)?;
    Ok(PyClassifier { service })
}

/// Vehicle type classification implemented in Rust.
#[pymodule]
fn vehicle_classifier_py(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyClassifier>()?;
    m.add_class::<PyOutcome>()?;
    m.add_function(wrap_pyfunction!(build_classifier, m)?)?;
    Ok(())
}
