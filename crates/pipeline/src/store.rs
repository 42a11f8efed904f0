use anyhow::Context;
use chrono::{DateTime, Utc};
use schema::{Category, DominantColor, WardrobeItemDraft};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A persisted wardrobe item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardrobeRecord {
    pub user_id: String,
    pub image_url: String,
    pub dominant_color: DominantColor,
    pub clothing_type: Category,
    pub clothing_subtype: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub unverified: bool,
}

impl WardrobeRecord {
    pub fn from_draft(user_id: &str, image_url: String, draft: &WardrobeItemDraft) -> Self {
        Self {
            user_id: user_id.to_string(),
            image_url,
            dominant_color: draft.dominant_color,
            clothing_type: draft.assignment.category,
            clothing_subtype: draft.assignment.subtype.clone(),
            uploaded_at: Utc::now(),
            unverified: draft.unverified,
        }
    }
}

/// Persistence collaborator for analyzed drafts.
pub trait DraftStore: Send + Sync {
    fn persist(&self, user_id: &str, draft: &WardrobeItemDraft) -> anyhow::Result<WardrobeRecord>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<WardrobeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<WardrobeRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DraftStore for MemoryStore {
    fn persist(&self, user_id: &str, draft: &WardrobeItemDraft) -> anyhow::Result<WardrobeRecord> {
        let record = WardrobeRecord::from_draft(
            user_id,
            format!("memory://{user_id}/{}/{}", draft.file_id, draft.file.name),
            draft,
        );
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }
}

/// Writes each item's image bytes and a JSON record under `<root>/<user_id>/`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

/// Keeps ASCII alphanumerics plus `.`, `-` and `_`; everything else becomes `_`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DraftStore for DirectoryStore {
    fn persist(&self, user_id: &str, draft: &WardrobeItemDraft) -> anyhow::Result<WardrobeRecord> {
        let dir = self.root.join(sanitize(user_id));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let stem = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            draft.file_id.0
        );
        let image_path = dir.join(format!("{stem}-{}", sanitize(&draft.file.name)));
        std::fs::write(&image_path, &draft.file.bytes)
            .with_context(|| format!("Failed to write {}", image_path.display()))?;

        let record = WardrobeRecord::from_draft(user_id, image_path.display().to_string(), draft);
        let record_path = dir.join(format!("{stem}.json"));
        let json = serde_json::to_vec_pretty(&record)?;
        std::fs::write(&record_path, json)
            .with_context(|| format!("Failed to write {}", record_path.display()))?;

        tracing::debug!(record = %record_path.display(), "Wardrobe record written");
        Ok(record)
    }
}
