use super::{InferenceBackend, Layer};
use crate::errors::ModelLoadError;
use crate::model::manifest::LayerConfig;
use ndarray::ArrayD;

/// A sequential stack of layers with a fixed per-sample input shape.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    layers: Vec<Layer>,
}

impl Network {
    /// Builds zero-weighted layers for `configs`, inferring each layer's
    /// input from the one before it.
    pub fn build(
        name: impl Into<String>,
        input_shape: &[usize],
        configs: &[LayerConfig],
    ) -> Result<Self, ModelLoadError> {
        let mut shape = input_shape.to_vec();
        let mut layers = Vec::with_capacity(configs.len());

        for config in configs {
            let (layer, next) = Layer::from_config(config, &shape)?;
            layers.push(layer);
            shape = next;
        }

        Ok(Self {
            name: name.into(),
            input_shape: input_shape.to_vec(),
            output_shape: shape,
            layers,
        })
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Per-sample output shape.
    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Glorot-uniform kernels and zero biases from a seeded generator.
    pub fn initialize(&mut self, seed: u64) {
        let mut rng = fastrand::Rng::with_seed(seed);
        for layer in &mut self.layers {
            let Some((kernel, fan_in, fan_out, bias)) = layer.params_mut() else {
                continue;
            };
            let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
            for w in kernel.iter_mut() {
                *w = (rng.f32() * 2.0 - 1.0) * limit;
            }
            bias.fill(0.0);
        }
    }

    pub fn forward(&self, input: &ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let shape = input.shape();
        anyhow::ensure!(
            shape.len() == self.input_shape.len() + 1 && shape[1..] == self.input_shape[..],
            "model '{}' expects input [N, {:?}], got {:?}",
            self.name,
            self.input_shape,
            shape
        );

        let mut x = input.clone();
        for layer in &self.layers {
            x = layer.forward(x)?;
        }
        Ok(x)
    }
}

impl InferenceBackend for Network {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, input: &ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let _s = tracing::debug_span!("network_forward", model = %self.name).entered();
        self.forward(input)
    }
}
