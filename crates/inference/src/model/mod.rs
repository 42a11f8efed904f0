pub mod adapter;
pub mod fallback;
pub mod loader;
pub mod manifest;

pub use adapter::{ModelAdapter, transplant_weights};
pub use fallback::fallback_network;
pub use loader::{AssetFetcher, DirectoryFetcher, ModelLoader};
pub use manifest::{Activation, LayerConfig, ModelManifest, Padding, SourceModel};
