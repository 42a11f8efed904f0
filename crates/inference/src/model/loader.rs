use crate::backend::{InferenceBackend, Network};
use crate::errors::ModelLoadError;
use crate::labels::NUM_CLASSES;
use crate::model::adapter::ModelAdapter;
use crate::model::manifest::{ModelManifest, SourceModel};
use common::{RetryPolicy, retry_with_backoff};
use schema::GRID_SIZE;
use std::path::PathBuf;
use std::sync::Arc;

/// Source of model asset bytes, addressed by relative name.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, ModelLoadError>;
}

/// Reads assets from a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for DirectoryFetcher {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, ModelLoadError> {
        let path = self.root.join(name);
        std::fs::read(&path).map_err(|e| ModelLoadError::Fetch {
            name: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Resolves `relative` against the directory holding `manifest_name`.
fn sibling_asset(manifest_name: &str, relative: &str) -> String {
    match manifest_name.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{relative}"),
        None => relative.to_string(),
    }
}

/// Fetches and rebuilds models. Fetches are retried, parsing is not.
#[derive(Clone)]
pub struct ModelLoader {
    fetcher: Arc<dyn AssetFetcher>,
    retry: RetryPolicy,
}

impl ModelLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }

    fn fetch(&self, name: &str) -> Result<Vec<u8>, ModelLoadError> {
        retry_with_backoff(|| self.fetcher.fetch(name), &self.retry, name)
    }

    pub fn load_source(&self, manifest_name: &str) -> Result<SourceModel, ModelLoadError> {
        let manifest = ModelManifest::from_json(&self.fetch(manifest_name)?)?;
        let weights_name = sibling_asset(manifest_name, &manifest.weights.path);
        let weights = self.fetch(&weights_name)?;

        tracing::debug!(
            manifest = manifest_name,
            weights = %weights_name,
            layers = manifest.layers.len(),
            weight_bytes = weights.len(),
            "Model assets fetched"
        );
        SourceModel::from_parts(manifest, &weights)
    }

    /// Loads the garment classifier with an explicit `[28, 28, 1]` input.
    pub fn load_garment(&self, manifest_name: &str) -> Result<Network, ModelLoadError> {
        let source = self.load_source(manifest_name)?;
        let network =
            ModelAdapter::new(&[GRID_SIZE, GRID_SIZE, 1]).adapt(manifest_name, source)?;

        let classes: usize = network.output_shape().iter().product();
        if network.output_shape().len() != 1 || classes != NUM_CLASSES {
            return Err(ModelLoadError::OutputClasses {
                expected: NUM_CLASSES,
                actual: classes,
            });
        }
        Ok(network)
    }

    /// Loads the feature extractor. `.onnx` assets need the `ort-backend`
    /// feature; anything else is read as a layers manifest with an RGB input.
    pub fn load_feature_extractor(
        &self,
        manifest_name: &str,
        input_size: u32,
    ) -> Result<Box<dyn InferenceBackend>, ModelLoadError> {
        if manifest_name.ends_with(".onnx") {
            return self.load_onnx(manifest_name);
        }

        let side = input_size as usize;
        let source = self.load_source(manifest_name)?;
        let network = ModelAdapter::new(&[side, side, 3]).adapt(manifest_name, source)?;
        Ok(Box::new(network))
    }

    #[cfg(feature = "ort-backend")]
    fn load_onnx(&self, name: &str) -> Result<Box<dyn InferenceBackend>, ModelLoadError> {
        let bytes = self.fetch(name)?;
        let backend = crate::backend::ort::OrtBackend::from_memory(name, &bytes)
            .map_err(|e| ModelLoadError::Backend(e.to_string()))?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "ort-backend"))]
    fn load_onnx(&self, name: &str) -> Result<Box<dyn InferenceBackend>, ModelLoadError> {
        Err(ModelLoadError::Backend(format!(
            "'{name}' is an ONNX model but the ort-backend feature is disabled"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves assets from memory and fails the first `failures` fetches.
    struct FlakyFetcher {
        assets: HashMap<String, Vec<u8>>,
        failures: Mutex<u32>,
    }

    impl AssetFetcher for FlakyFetcher {
        fn fetch(&self, name: &str) -> Result<Vec<u8>, ModelLoadError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ModelLoadError::Fetch {
                    name: name.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            self.assets.get(name).cloned().ok_or(ModelLoadError::Fetch {
                name: name.to_string(),
                reason: "not found".to_string(),
            })
        }
    }

    fn garment_assets(units: usize) -> HashMap<String, Vec<u8>> {
        let manifest = format!(
            r#"{{
                "layers": [
                    {{ "class_name": "InputLayer", "name": "input", "batch_input_shape": [null, null, null, 1] }},
                    {{ "class_name": "Flatten", "name": "flatten" }},
                    {{ "class_name": "Dense", "name": "logits", "units": {units} }}
                ],
                "weights": {{
                    "path": "weights.bin",
                    "specs": [
                        {{ "layer": "logits", "name": "kernel", "shape": [784, {units}] }},
                        {{ "layer": "logits", "name": "bias", "shape": [{units}] }}
                    ]
                }}
            }}"#
        );
        let weights: Vec<u8> = (0..784 * units + units)
            .flat_map(|i| ((i % 7) as f32 * 0.01).to_le_bytes())
            .collect();

        HashMap::from([
            ("garment/model.json".to_string(), manifest.into_bytes()),
            ("garment/weights.bin".to_string(), weights),
        ])
    }

    fn loader(assets: HashMap<String, Vec<u8>>, failures: u32) -> ModelLoader {
        let fetcher = FlakyFetcher {
            assets,
            failures: Mutex::new(failures),
        };
        ModelLoader::new(Arc::new(fetcher), RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[test]
    fn weights_resolve_next_to_the_manifest() {
        assert_eq!(sibling_asset("garment/model.json", "w.bin"), "garment/w.bin");
        assert_eq!(sibling_asset("model.json", "w.bin"), "w.bin");
    }

    #[test]
    fn loads_garment_model_after_transient_failures() {
        let network = loader(garment_assets(10), 2)
            .load_garment("garment/model.json")
            .unwrap();
        assert_eq!(network.input_shape(), &[28, 28, 1]);
        assert_eq!(network.output_shape(), &[10]);
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let err = loader(garment_assets(10), 5)
            .load_garment("garment/model.json")
            .unwrap_err();
        assert!(matches!(err, ModelLoadError::Fetch { .. }));
    }

    #[test]
    fn rejects_wrong_class_count() {
        let err = loader(garment_assets(4), 0)
            .load_garment("garment/model.json")
            .unwrap_err();
        assert!(matches!(
            err,
            ModelLoadError::OutputClasses {
                expected: 10,
                actual: 4
            }
        ));
    }

    #[test]
    fn directory_fetcher_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("garment")).unwrap();
        std::fs::write(dir.path().join("garment/model.json"), b"{}").unwrap();

        let fetcher = DirectoryFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("garment/model.json").unwrap(), b"{}");
        assert!(matches!(
            fetcher.fetch("missing.json"),
            Err(ModelLoadError::Fetch { .. })
        ));
    }

    #[cfg(not(feature = "ort-backend"))]
    #[test]
    fn onnx_requires_the_backend_feature() {
        let result = loader(HashMap::new(), 0).load_feature_extractor("features/model.onnx", 224);
        assert!(matches!(result, Err(ModelLoadError::Backend(_))));
    }
}
