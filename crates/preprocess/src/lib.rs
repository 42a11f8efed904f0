//! Image preprocessing: the classifier grid, the feature extractor letterbox,
//! and dominant color sampling.

pub mod color;
pub mod errors;
pub mod grid;
pub mod letterbox;

use ndarray::{Array, IxDyn};
use schema::RawImage;

pub use color::{ColorSampler, SamplerConfig};
pub use errors::{ColorError, PreprocessError};
pub use grid::{GridPreprocessor, to_grid};
pub use letterbox::{FeaturePreProcessor, Letterbox, TensorLayout};

/// Turns a decoded image into a model input tensor.
///
/// Implementations allocate their buffers per call, so one instance can
/// serve concurrent callers.
pub trait Preprocess {
    fn preprocess(&self, image: &RawImage) -> Result<Array<f32, IxDyn>, PreprocessError>;

    /// Width and height of the produced image plane.
    fn input_size(&self) -> (u32, u32);
}
