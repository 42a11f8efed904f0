//! Data model shared by the preprocessing, inference and pipeline crates.

pub mod classification;
pub mod color;
pub mod draft;
pub mod errors;
pub mod image;

pub use classification::{Category, CategoryAssignment, ClassificationResult, ModelSource};
pub use color::DominantColor;
pub use draft::{FileId, FileRef, FileState, WardrobeItemDraft};
pub use errors::SchemaError;
pub use image::{GRID_SIZE, NormalizedGrid, RawImage};
