use crate::service::ServiceState;
use preprocess::PreprocessError;
use schema::SchemaError;
use thiserror::Error;

/// Failure while fetching, parsing or rebuilding a model.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to fetch model asset '{name}': {reason}")]
    Fetch { name: String, reason: String },

    #[error("Invalid model manifest: {0}")]
    Manifest(String),

    #[error("Invalid weight data: {0}")]
    Weights(String),

    #[error("Unsupported layer '{0}'")]
    UnsupportedLayer(String),

    #[error("Layer '{layer}' expects weight shape {expected:?}, got {actual:?}")]
    WeightShape {
        layer: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Layer '{layer}' cannot accept input shape {input:?}: {reason}")]
    Shape {
        layer: String,
        input: Vec<usize>,
        reason: String,
    },

    #[error("Model adapter contract violated: {0}")]
    AdapterContract(String),

    #[error("Model produces {actual} classes, expected {expected}")]
    OutputClasses { expected: usize, actual: usize },

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier is not ready (state: {0})")]
    NotReady(ServiceState),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("No feature extractor is loaded")]
    FeaturesUnavailable,
}

impl ClassifierError {
    pub(crate) fn inference(reason: impl ToString) -> Self {
        ClassifierError::Inference(reason.to_string())
    }
}

impl From<SchemaError> for ClassifierError {
    fn from(e: SchemaError) -> Self {
        ClassifierError::Inference(e.to_string())
    }
}
