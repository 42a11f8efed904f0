//! Garment classification: model loading and repair, the classifier service
//! and the label taxonomy.

pub mod backend;
pub mod config;
pub mod errors;
pub mod labels;
pub mod model;
pub mod postprocessing;
pub mod service;
pub mod taxonomy;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, Network};
pub use config::ClassifierConfig;
pub use errors::{ClassifierError, ModelLoadError};
pub use labels::GARMENT_CLASSES;
pub use model::{AssetFetcher, DirectoryFetcher, ModelAdapter, ModelLoader};
pub use service::{ClassifierService, GarmentClassifier, ServiceState};
pub use taxonomy::{CategoryMapper, CategoryRule, map_to_category};
