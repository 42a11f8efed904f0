use crate::backend::InferenceBackend;
use crate::config::ClassifierConfig;
use crate::errors::{ClassifierError, ModelLoadError};
use crate::model::{AssetFetcher, ModelLoader, fallback_network};
use crate::postprocessing::top_prediction;
use common::span;
use ndarray::Array1;
use preprocess::{FeaturePreProcessor, GridPreprocessor, Preprocess};
use schema::{ClassificationResult, ModelSource, RawImage};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Loading,
    Ready,
    /// Running on the fallback classifier after a load failure.
    Degraded,
    Disposed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Loading => "loading",
            ServiceState::Ready => "ready",
            ServiceState::Degraded => "degraded",
            ServiceState::Disposed => "disposed",
        }
    }

    pub fn can_classify(&self) -> bool {
        matches!(self, ServiceState::Ready | ServiceState::Degraded)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline needs from a classifier.
pub trait GarmentClassifier: Send + Sync {
    fn state(&self) -> ServiceState;

    /// Resolves once loading has finished, or fails with `NotReady` on timeout.
    fn wait_ready(&self) -> impl Future<Output = Result<ServiceState, ClassifierError>> + Send;

    fn classify(
        &self,
        image: &RawImage,
    ) -> impl Future<Output = Result<ClassificationResult, ClassifierError>> + Send;
}

struct LoadedModels {
    garment: Box<dyn InferenceBackend>,
    source: ModelSource,
    features: Option<Box<dyn InferenceBackend>>,
}

impl LoadedModels {
    fn load(config: &ClassifierConfig, fetcher: Arc<dyn AssetFetcher>) -> Result<Self, ModelLoadError> {
        let _s = span!("load_models");
        let loader = ModelLoader::new(fetcher, config.fetch_retry.clone());

        let garment = loader.load_garment(&config.garment_model)?;
        let features = config
            .feature_model
            .as_deref()
            .map(|name| loader.load_feature_extractor(name, config.feature_input_size))
            .transpose()?;

        Ok(Self {
            garment: Box::new(garment),
            source: ModelSource::Trained,
            features,
        })
    }

    fn fallback(config: &ClassifierConfig) -> Result<Self, ModelLoadError> {
        Ok(Self {
            garment: Box::new(fallback_network(config.fallback_seed)?),
            source: ModelSource::Fallback,
            features: None,
        })
    }

    fn classify(&self, image: &RawImage) -> Result<ClassificationResult, ClassifierError> {
        let _s = span!("classify");

        let grid = GridPreprocessor.to_grid(image)?;
        let output = self
            .garment
            .infer(&grid.to_input_tensor())
            .map_err(ClassifierError::inference)?;
        let prediction = top_prediction(&output)?;

        Ok(ClassificationResult::new(
            prediction.label,
            prediction.probability,
            self.source,
        )?)
    }

    fn extract_features(&self, image: &RawImage, input_size: u32) -> Result<Array1<f32>, ClassifierError> {
        let _s = span!("extract_features");

        let extractor = self
            .features
            .as_ref()
            .ok_or(ClassifierError::FeaturesUnavailable)?;
        let preprocessor = FeaturePreProcessor::new((input_size, input_size), extractor.layout());
        let input = preprocessor.preprocess(image)?;
        let output = extractor.infer(&input).map_err(ClassifierError::inference)?;

        Ok(output.iter().copied().collect())
    }
}

/// Owns the garment classifier and feature extractor.
///
/// Created in `Loading`; [`ClassifierService::initialize`] moves it to
/// `Ready`, or to `Degraded` with an untrained fallback if any model fails to
/// load. Models are shared read-only between concurrent calls.
pub struct ClassifierService {
    config: ClassifierConfig,
    state: watch::Sender<ServiceState>,
    models: RwLock<Option<Arc<LoadedModels>>>,
    init_lock: Mutex<()>,
}

impl ClassifierService {
    pub fn new(config: ClassifierConfig) -> Self {
        let (state, _) = watch::channel(ServiceState::Loading);
        Self {
            config,
            state,
            models: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Loads both models. Later calls return the current state without
    /// loading again.
    ///
    /// Only fails if the fallback classifier itself cannot be built.
    pub async fn initialize(
        &self,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<ServiceState, ModelLoadError> {
        let _guard = self.init_lock.lock().await;
        let current = self.state();
        if current != ServiceState::Loading {
            tracing::debug!(state = %current, "Classifier already initialized");
            return Ok(current);
        }

        let config = self.config.clone();
        let loaded = tokio::task::spawn_blocking(move || LoadedModels::load(&config, fetcher))
            .await
            .map_err(|e| ModelLoadError::Backend(e.to_string()))
            .and_then(|result| result);

        let (models, next) = match loaded {
            Ok(models) => (models, ServiceState::Ready),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    garment_model = %self.config.garment_model,
                    "Model load failed, classifying with the fallback network"
                );
                (LoadedModels::fallback(&self.config)?, ServiceState::Degraded)
            }
        };

        *self.models.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(models));

        let installed = self.state.send_if_modified(|state| {
            if *state == ServiceState::Loading {
                *state = next;
                true
            } else {
                false
            }
        });
        if !installed {
            // Disposed while loading.
            self.models
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return Ok(self.state());
        }

        tracing::info!(state = %next, "Classifier initialized");
        Ok(next)
    }

    fn loaded(&self) -> Result<Arc<LoadedModels>, ClassifierError> {
        let state = self.state();
        if !state.can_classify() {
            return Err(ClassifierError::NotReady(state));
        }
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClassifierError::NotReady(state))
    }

    pub async fn wait_ready(&self) -> Result<ServiceState, ClassifierError> {
        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(
            self.config.ready_timeout,
            rx.wait_for(|state| *state != ServiceState::Loading),
        )
        .await
        .map(|result| result.map(|state| *state));

        match waited {
            Ok(Ok(state)) if state.can_classify() => Ok(state),
            Ok(Ok(state)) => Err(ClassifierError::NotReady(state)),
            Ok(Err(_)) => Err(ClassifierError::NotReady(self.state())),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.ready_timeout.as_millis() as u64,
                    "Timed out waiting for the classifier to load"
                );
                Err(ClassifierError::NotReady(ServiceState::Loading))
            }
        }
    }

    pub async fn classify(&self, image: &RawImage) -> Result<ClassificationResult, ClassifierError> {
        let models = self.loaded()?;
        let image = image.clone();

        tokio::task::spawn_blocking(move || models.classify(&image))
            .await
            .map_err(ClassifierError::inference)?
    }

    /// Flattened embedding from the feature extractor.
    pub async fn extract_features(&self, image: &RawImage) -> Result<Array1<f32>, ClassifierError> {
        let models = self.loaded()?;
        if models.features.is_none() {
            return Err(ClassifierError::FeaturesUnavailable);
        }
        let image = image.clone();
        let input_size = self.config.feature_input_size;

        tokio::task::spawn_blocking(move || models.extract_features(&image, input_size))
            .await
            .map_err(ClassifierError::inference)?
    }

    /// Releases the models. Returns `false` if already disposed.
    pub fn dispose(&self) -> bool {
        let previous = self.state.send_replace(ServiceState::Disposed);
        let released = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if previous == ServiceState::Disposed {
            return false;
        }
        tracing::info!(previous = %previous, released = released.is_some(), "Classifier disposed");
        true
    }
}

impl GarmentClassifier for ClassifierService {
    fn state(&self) -> ServiceState {
        ClassifierService::state(self)
    }

    async fn wait_ready(&self) -> Result<ServiceState, ClassifierError> {
        ClassifierService::wait_ready(self).await
    }

    async fn classify(&self, image: &RawImage) -> Result<ClassificationResult, ClassifierError> {
        ClassifierService::classify(self, image).await
    }
}
