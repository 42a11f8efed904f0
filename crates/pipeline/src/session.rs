use crate::errors::PipelineError;
use crate::orchestrator::BatchOutcome;
use crate::store::{DraftStore, WardrobeRecord};
use schema::WardrobeItemDraft;

/// Drafts awaiting persistence for one user.
///
/// Drafts are released after a successful [`UploadSession::commit`] or an
/// explicit [`UploadSession::clear`].
#[derive(Debug)]
pub struct UploadSession {
    user_id: String,
    drafts: Vec<WardrobeItemDraft>,
}

impl UploadSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            drafts: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn drafts(&self) -> &[WardrobeItemDraft] {
        &self.drafts
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Stages a finished batch. Cancelled batches are refused so they are never persisted.
    pub fn stage(&mut self, outcome: BatchOutcome) -> Result<usize, PipelineError> {
        if outcome.cancelled {
            tracing::warn!(
                completed = outcome.drafts.len(),
                aborted = outcome.aborted.len(),
                "Refusing to stage a cancelled batch"
            );
            return Err(PipelineError::Cancelled);
        }
        let staged = outcome.drafts.len();
        self.drafts.extend(outcome.drafts);
        Ok(staged)
    }

    /// Hands every staged draft to `store`, then releases them.
    ///
    /// Drafts are released as soon as they are persisted. On error only the
    /// drafts from the failing one onwards stay staged, so a retry never
    /// persists a draft twice.
    pub fn commit(&mut self, store: &dyn DraftStore) -> Result<Vec<WardrobeRecord>, PipelineError> {
        let mut records = Vec::with_capacity(self.drafts.len());
        let mut failure = None;
        for draft in &self.drafts {
            match store.persist(&self.user_id, draft) {
                Ok(record) => records.push(record),
                Err(e) => {
                    failure = Some(PipelineError::Persist {
                        file: draft.file_id,
                        source: e.into(),
                    });
                    break;
                }
            }
        }
        self.drafts = self.drafts.split_off(records.len());

        if let Some(err) = failure {
            tracing::warn!(
                user = %self.user_id,
                persisted = records.len(),
                remaining = self.drafts.len(),
                error = %err,
                "Upload session commit interrupted"
            );
            return Err(err);
        }

        tracing::info!(user = %self.user_id, records = records.len(), "Upload session committed");
        Ok(records)
    }

    /// Drops staged drafts without persisting them. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.drafts.len();
        self.drafts.clear();
        dropped
    }
}
