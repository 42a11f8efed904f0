use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    /// The off-screen pixel buffers or the resizer could not be set up.
    #[error("Rendering failed during {stage}: {reason}")]
    Rendering { stage: &'static str, reason: String },
}

impl PreprocessError {
    pub(crate) fn rendering(stage: &'static str, reason: impl ToString) -> Self {
        PreprocessError::Rendering {
            stage,
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorError {
    #[error(transparent)]
    Rendering(#[from] PreprocessError),

    /// Quantization had no usable pixels or produced no color.
    #[error("Color extraction failed: {0}")]
    Extraction(String),

    #[error("Color extraction task failed: {0}")]
    Task(String),
}
