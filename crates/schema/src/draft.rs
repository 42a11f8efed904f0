use crate::{CategoryAssignment, ClassificationResult, DominantColor};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Identifier assigned to a file when it is submitted to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file-{}", self.0)
    }
}

/// A user-selected file: its name and the original encoded bytes.
#[derive(Clone, Serialize)]
pub struct FileRef {
    pub name: String,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Processing state of a single file within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileState {
    Selected,
    Decoding,
    Analyzing,
    Ready,
    /// Color or category could not be determined; placeholders were used.
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl FileState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileState::Ready | FileState::PartiallyFailed | FileState::Failed | FileState::Cancelled
        )
    }
}

/// Derived attributes of one uploaded file, not yet persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WardrobeItemDraft {
    pub file_id: FileId,
    pub file: FileRef,
    pub dominant_color: DominantColor,
    pub assignment: CategoryAssignment,
    pub classification: Option<ClassificationResult>,
    pub state: FileState,
    /// Set when the category came from the fallback classifier.
    pub unverified: bool,
}

impl WardrobeItemDraft {
    /// Draft for a file that could not be analyzed at all.
    pub fn failed(file_id: FileId, file: FileRef, state: FileState) -> Self {
        Self {
            file_id,
            file,
            dominant_color: DominantColor::PLACEHOLDER,
            assignment: CategoryAssignment::unknown(),
            classification: None,
            state,
            unverified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!FileState::Selected.is_terminal());
        assert!(!FileState::Decoding.is_terminal());
        assert!(!FileState::Analyzing.is_terminal());
        assert!(FileState::Ready.is_terminal());
        assert!(FileState::PartiallyFailed.is_terminal());
        assert!(FileState::Failed.is_terminal());
        assert!(FileState::Cancelled.is_terminal());
    }

    #[test]
    fn failed_draft_uses_placeholders() {
        let draft = WardrobeItemDraft::failed(
            FileId(2),
            FileRef::new("broken.png", vec![1u8, 2, 3]),
            FileState::Failed,
        );
        assert_eq!(draft.dominant_color, DominantColor::PLACEHOLDER);
        assert!(draft.assignment.is_unknown());
        assert!(draft.classification.is_none());
        assert_eq!(draft.file.len(), 3);
        assert_eq!(draft.file_id.to_string(), "file-2");
    }

    #[test]
    fn draft_json_omits_file_bytes() {
        let draft = WardrobeItemDraft::failed(
            FileId(0),
            FileRef::new("a.png", vec![0u8; 4]),
            FileState::Failed,
        );
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["file"], serde_json::json!({ "name": "a.png" }));
        assert_eq!(json["dominantColor"], "#808080");
        assert_eq!(json["state"], "Failed");
    }
}
