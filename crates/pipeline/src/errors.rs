use schema::{FileId, FileState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode {file}: {reason}")]
    Decode { file: FileId, reason: String },

    #[error("{file}: invalid state transition {from:?} -> {to:?}")]
    InvalidTransition {
        file: FileId,
        from: FileState,
        to: FileState,
    },

    #[error("Batch was cancelled; nothing was persisted")]
    Cancelled,

    #[error("Failed to persist {file}: {source}")]
    Persist {
        file: FileId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
