use crate::config::PipelineConfig;
use crate::decode::decode_image;
use crate::errors::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::state_machine::FileStateMachine;
use inference::{CategoryMapper, ClassifierError, GarmentClassifier};
use preprocess::ColorSampler;
use schema::{
    CategoryAssignment, ClassificationResult, DominantColor, FileId, FileRef, FileState, ModelSource,
    RawImage, WardrobeItemDraft,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Requests cancellation of an in-flight batch. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.signal.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One draft per finished file, in submission order.
    pub drafts: Vec<WardrobeItemDraft>,
    /// Files whose work was aborted, in `Cancelled` state.
    pub aborted: Vec<WardrobeItemDraft>,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.drafts.len() + self.aborted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn draft(&self, file: FileId) -> Option<&WardrobeItemDraft> {
        self.drafts.iter().find(|d| d.file_id == file)
    }
}

/// Per-file work shared by every task of a pipeline.
struct FileAnalyzer<C> {
    classifier: Arc<C>,
    sampler: ColorSampler,
    mapper: CategoryMapper<'static>,
    placeholder: DominantColor,
    metrics: PipelineMetrics,
}

impl<C: GarmentClassifier> FileAnalyzer<C> {
    async fn analyze(&self, id: FileId, file: FileRef) -> WardrobeItemDraft {
        let started = Instant::now();
        let mut machine = FileStateMachine::new(id);

        let draft = self.run(&mut machine, id, file).await;

        tracing::debug!(
            state = ?draft.state,
            color = %draft.dominant_color,
            category = %draft.assignment.category,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "File analyzed"
        );
        self.metrics.record(draft.state, started.elapsed());
        draft
    }

    async fn run(
        &self,
        machine: &mut FileStateMachine,
        id: FileId,
        file: FileRef,
    ) -> WardrobeItemDraft {
        transition(machine, FileState::Decoding);

        let bytes = Arc::clone(&file.bytes);
        let decoded = tokio::task::spawn_blocking(move || decode_image(id, &bytes))
            .await
            .unwrap_or_else(|e| {
                Err(PipelineError::Decode {
                    file: id,
                    reason: e.to_string(),
                })
            });

        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "Decode failed, marking file as failed");
                transition(machine, FileState::Failed);
                let mut draft = WardrobeItemDraft::failed(id, file, FileState::Failed);
                draft.dominant_color = self.placeholder;
                return draft;
            }
        };

        transition(machine, FileState::Analyzing);

        let (color, classification) =
            tokio::join!(self.sampler.extract_dominant_color(&image), self.classify(&image));
        drop(image);

        let mut partial = false;

        let dominant_color = color.unwrap_or_else(|e| {
            tracing::warn!(error = %e, placeholder = %self.placeholder, "Color extraction failed");
            partial = true;
            self.placeholder
        });

        let (assignment, classification) = match classification {
            Ok(result) => (self.mapper.map_to_category(&result), Some(result)),
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed, category set to Unknown");
                (CategoryAssignment::unknown(), None)
            }
        };
        partial |= assignment.is_unknown();

        let unverified = classification
            .as_ref()
            .is_some_and(|r| r.source() == ModelSource::Fallback);

        let state = if partial {
            FileState::PartiallyFailed
        } else {
            FileState::Ready
        };
        transition(machine, state);

        WardrobeItemDraft {
            file_id: id,
            file,
            dominant_color,
            assignment,
            classification,
            state,
            unverified,
        }
    }

    /// Queues behind model loading instead of failing while it is in progress.
    async fn classify(&self, image: &RawImage) -> Result<ClassificationResult, ClassifierError> {
        if !self.classifier.state().can_classify() {
            self.classifier.wait_ready().await?;
        }
        self.classifier.classify(image).await
    }
}

fn transition(machine: &mut FileStateMachine, next: FileState) {
    if let Err(e) = machine.advance(next) {
        tracing::error!(error = %e, "Rejected file state transition");
    }
}

/// Runs color sampling, classification and category mapping over batches of
/// uploaded files with bounded concurrency.
pub struct UploadPipeline<C> {
    analyzer: Arc<FileAnalyzer<C>>,
    max_concurrency: usize,
    next_id: AtomicU64,
}

impl<C: GarmentClassifier + 'static> UploadPipeline<C> {
    pub fn new(classifier: Arc<C>, config: &PipelineConfig) -> Self {
        Self::with_mapper(classifier, config, CategoryMapper::default())
    }

    pub fn with_mapper(
        classifier: Arc<C>,
        config: &PipelineConfig,
        mapper: CategoryMapper<'static>,
    ) -> Self {
        let analyzer = FileAnalyzer {
            classifier,
            sampler: ColorSampler::new(config.sampler.clone()),
            mapper,
            placeholder: config.placeholder_color,
            metrics: PipelineMetrics::new("pipeline"),
        };
        Self {
            analyzer: Arc::new(analyzer),
            max_concurrency: config.max_concurrency.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Assigns ids; they stay unique across batches of this pipeline.
    fn submit(&self, files: Vec<FileRef>) -> Vec<(FileId, FileRef)> {
        files
            .into_iter()
            .map(|file| (FileId(self.next_id.fetch_add(1, Ordering::Relaxed)), file))
            .collect()
    }

    /// Analyzes every file, returning one draft per file even when some fail.
    ///
    /// Cancelling `cancel` aborts outstanding work; drafts already finished
    /// are kept and the rest are reported as aborted.
    pub async fn process(&self, files: Vec<FileRef>, cancel: &CancelToken) -> BatchOutcome {
        let submitted = self.submit(files);
        let batch_span = tracing::info_span!("process_batch", files = submitted.len());

        async {
            let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
            let mut tasks = JoinSet::new();

            for (index, (id, file)) in submitted.iter().cloned().enumerate() {
                let analyzer = Arc::clone(&self.analyzer);
                let semaphore = Arc::clone(&semaphore);
                let span = tracing::info_span!("analyze_file", file = %id, name = %file.name);

                tasks.spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await;
                        (index, analyzer.analyze(id, file).await)
                    }
                    .instrument(span),
                );
            }

            let mut slots: Vec<Option<WardrobeItemDraft>> = vec![None; submitted.len()];
            let mut cancelled = false;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled(), if !cancelled => {
                        tracing::warn!(outstanding = tasks.len(), "Batch cancelled, aborting outstanding files");
                        tasks.abort_all();
                        cancelled = true;
                    }
                    next = tasks.join_next() => match next {
                        None => break,
                        Some(Ok((index, draft))) => slots[index] = Some(draft),
                        Some(Err(e)) if e.is_cancelled() => {}
                        Some(Err(e)) => tracing::error!(error = %e, "File task panicked"),
                    },
                }
            }

            let mut outcome = BatchOutcome {
                cancelled,
                ..BatchOutcome::default()
            };
            for ((id, file), slot) in submitted.into_iter().zip(slots) {
                match slot {
                    Some(draft) => outcome.drafts.push(draft),
                    None if cancelled => outcome
                        .aborted
                        .push(WardrobeItemDraft::failed(id, file, FileState::Cancelled)),
                    None => {
                        let mut draft = WardrobeItemDraft::failed(id, file, FileState::Failed);
                        draft.dominant_color = self.analyzer.placeholder;
                        outcome.drafts.push(draft);
                    }
                }
            }

            tracing::info!(
                drafts = outcome.drafts.len(),
                aborted = outcome.aborted.len(),
                failed = outcome
                    .drafts
                    .iter()
                    .filter(|d| d.state != FileState::Ready)
                    .count(),
                "Batch processed"
            );
            outcome
        }
        .instrument(batch_span)
        .await
    }
}
