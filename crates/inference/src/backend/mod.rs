pub mod layers;
pub mod network;

#[cfg(feature = "ort-backend")]
pub mod ort;

use ndarray::ArrayD;
use preprocess::TensorLayout;

pub use layers::Layer;
pub use network::Network;

/// A loaded model that maps an input tensor to an output tensor.
///
/// Backends are shared between concurrent classification calls, so `infer`
/// takes `&self` and implementations must be `Send + Sync`.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, input: &ArrayD<f32>) -> anyhow::Result<ArrayD<f32>>;

    /// Layout the backend expects for image inputs.
    fn layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }
}
