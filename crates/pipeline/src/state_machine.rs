use crate::errors::PipelineError;
use schema::{FileId, FileState};

/// Tracks one file through `Selected -> Decoding -> Analyzing -> Ready`,
/// with `Failed` after decoding, `PartiallyFailed` after analysis, and
/// `Cancelled` from any non-terminal state.
#[derive(Debug, Clone)]
pub struct FileStateMachine {
    file: FileId,
    current_state: FileState,
}

impl FileStateMachine {
    pub fn new(file: FileId) -> Self {
        Self {
            file,
            current_state: FileState::Selected,
        }
    }

    pub fn is_allowed(from: FileState, to: FileState) -> bool {
        use FileState::*;
        matches!(
            (from, to),
            (Selected, Decoding)
                | (Decoding, Analyzing)
                | (Decoding, Failed)
                | (Analyzing, Ready)
                | (Analyzing, PartiallyFailed)
                | (Selected | Decoding | Analyzing, Cancelled)
        )
    }

    pub fn advance(&mut self, next: FileState) -> Result<FileState, PipelineError> {
        let previous = self.current_state;
        if !Self::is_allowed(previous, next) {
            return Err(PipelineError::InvalidTransition {
                file: self.file,
                from: previous,
                to: next,
            });
        }

        self.current_state = next;
        tracing::debug!(file = %self.file, from = ?previous, to = ?next, "File state transition");
        Ok(previous)
    }

    pub fn current_state(&self) -> FileState {
        self.current_state
    }

    pub fn file(&self) -> FileId {
        self.file
    }
}
