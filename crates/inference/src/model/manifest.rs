//! On-disk model format: a JSON topology (`model.json`) next to a flat
//! little-endian `f32` weight file.
//!
//! ```json
//! {
//!   "layers": [
//!     { "class_name": "InputLayer", "name": "input", "batch_input_shape": [null, 28, 28, 1] },
//!     { "class_name": "Flatten", "name": "flatten" },
//!     { "class_name": "Dense", "name": "logits", "units": 10 }
//!   ],
//!   "weights": {
//!     "path": "weights.bin",
//!     "specs": [
//!       { "layer": "logits", "name": "kernel", "shape": [784, 10] },
//!       { "layer": "logits", "name": "bias", "shape": [10] }
//!     ]
//!   }
//! }
//! ```

use crate::errors::ModelLoadError;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

fn unit_strides() -> [usize; 2] {
    [1, 1]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum LayerConfig {
    InputLayer {
        name: String,
        /// Leading entry is the batch dimension; `null` marks an unknown size.
        #[serde(default)]
        batch_input_shape: Option<Vec<Option<usize>>>,
    },
    Conv2D {
        name: String,
        filters: usize,
        kernel_size: [usize; 2],
        #[serde(default = "unit_strides")]
        strides: [usize; 2],
        #[serde(default)]
        padding: Padding,
        #[serde(default)]
        activation: Activation,
    },
    MaxPooling2D {
        name: String,
        pool_size: [usize; 2],
        #[serde(default)]
        strides: Option<[usize; 2]>,
    },
    Flatten {
        name: String,
    },
    Dense {
        name: String,
        units: usize,
        #[serde(default)]
        activation: Activation,
    },
    Dropout {
        name: String,
        #[serde(default)]
        rate: f32,
    },
}

impl LayerConfig {
    pub fn name(&self) -> &str {
        match self {
            LayerConfig::InputLayer { name, .. }
            | LayerConfig::Conv2D { name, .. }
            | LayerConfig::MaxPooling2D { name, .. }
            | LayerConfig::Flatten { name }
            | LayerConfig::Dense { name, .. }
            | LayerConfig::Dropout { name, .. } => name,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, LayerConfig::InputLayer { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub layer: String,
    pub name: String,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsManifest {
    /// Relative to the manifest's own location.
    pub path: String,
    pub specs: Vec<WeightSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub layers: Vec<LayerConfig>,
    pub weights: WeightsManifest,
}

impl ModelManifest {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        serde_json::from_slice(bytes).map_err(|e| ModelLoadError::Manifest(e.to_string()))
    }
}

/// A layer exactly as stored, with its weight tensors in spec order.
#[derive(Debug, Clone)]
pub struct SourceLayer {
    pub config: LayerConfig,
    pub weights: Vec<ArrayD<f32>>,
}

/// A stored model before it is rebuilt into a runnable network.
#[derive(Debug, Clone)]
pub struct SourceModel {
    pub layers: Vec<SourceLayer>,
}

impl SourceModel {
    pub fn from_parts(manifest: ModelManifest, weight_bytes: &[u8]) -> Result<Self, ModelLoadError> {
        if weight_bytes.len() % 4 != 0 {
            return Err(ModelLoadError::Weights(format!(
                "weight file length {} is not a multiple of 4",
                weight_bytes.len()
            )));
        }

        let floats: Vec<f32> = weight_bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let index: HashMap<&str, usize> = manifest
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name(), i))
            .collect();
        if index.len() != manifest.layers.len() {
            return Err(ModelLoadError::Manifest("duplicate layer names".to_string()));
        }

        let mut weights: Vec<Vec<ArrayD<f32>>> = vec![Vec::new(); manifest.layers.len()];
        let mut offset = 0usize;

        for spec in &manifest.weights.specs {
            let layer = *index.get(spec.layer.as_str()).ok_or_else(|| {
                ModelLoadError::Manifest(format!(
                    "weight '{}' refers to unknown layer '{}'",
                    spec.name, spec.layer
                ))
            })?;

            let len: usize = spec.shape.iter().product();
            let end = offset + len;
            if end > floats.len() {
                return Err(ModelLoadError::Weights(format!(
                    "weight '{}/{}' needs {} values past offset {}, file has {}",
                    spec.layer,
                    spec.name,
                    len,
                    offset,
                    floats.len()
                )));
            }

            let tensor = ArrayD::from_shape_vec(IxDyn(&spec.shape), floats[offset..end].to_vec())
                .map_err(|e| ModelLoadError::Weights(e.to_string()))?;
            weights[layer].push(tensor);
            offset = end;
        }

        if offset != floats.len() {
            return Err(ModelLoadError::Weights(format!(
                "{} trailing values after the last weight",
                floats.len() - offset
            )));
        }

        let layers = manifest
            .layers
            .into_iter()
            .zip(weights)
            .map(|(config, weights)| SourceLayer { config, weights })
            .collect();

        Ok(Self { layers })
    }

    /// Input shape declared by the leading input layer, without the batch dimension.
    pub fn declared_input(&self) -> Option<&[Option<usize>]> {
        match self.layers.first().map(|l| &l.config) {
            Some(LayerConfig::InputLayer {
                batch_input_shape: Some(shape),
                ..
            }) if !shape.is_empty() => Some(&shape[1..]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    const MANIFEST: &str = r#"{
        "layers": [
            { "class_name": "InputLayer", "name": "input", "batch_input_shape": [null, 2, 2, 1] },
            { "class_name": "Flatten", "name": "flatten" },
            { "class_name": "Dense", "name": "out", "units": 2, "activation": "relu" }
        ],
        "weights": {
            "path": "weights.bin",
            "specs": [
                { "layer": "out", "name": "kernel", "shape": [4, 2] },
                { "layer": "out", "name": "bias", "shape": [2] }
            ]
        }
    }"#;

    #[test]
    fn parses_topology_with_defaults() {
        let manifest = ModelManifest::from_json(MANIFEST.as_bytes()).unwrap();
        assert_eq!(manifest.layers.len(), 3);
        assert!(manifest.layers[0].is_input());
        assert_eq!(
            manifest.layers[2],
            LayerConfig::Dense {
                name: "out".to_string(),
                units: 2,
                activation: Activation::Relu,
            }
        );
    }

    #[test]
    fn conv_defaults_to_unit_strides_and_valid_padding() {
        let json = r#"{ "class_name": "Conv2D", "name": "c", "filters": 4, "kernel_size": [3, 3] }"#;
        let config: LayerConfig = serde_json::from_str(json).unwrap();
        match config {
            LayerConfig::Conv2D {
                strides,
                padding,
                activation,
                ..
            } => {
                assert_eq!(strides, [1, 1]);
                assert_eq!(padding, Padding::Valid);
                assert_eq!(activation, Activation::Linear);
            }
            other => panic!("unexpected layer {other:?}"),
        }
    }

    #[test]
    fn unknown_layer_class_is_rejected() {
        let json = r#"{ "layers": [{ "class_name": "LSTM", "name": "x" }], "weights": { "path": "w", "specs": [] } }"#;
        assert!(matches!(
            ModelManifest::from_json(json.as_bytes()),
            Err(ModelLoadError::Manifest(_))
        ));
    }

    #[test]
    fn splits_weights_per_layer() {
        let manifest = ModelManifest::from_json(MANIFEST.as_bytes()).unwrap();
        let values: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let model = SourceModel::from_parts(manifest, &le_bytes(&values)).unwrap();

        assert!(model.layers[0].weights.is_empty());
        assert!(model.layers[1].weights.is_empty());
        assert_eq!(model.layers[2].weights.len(), 2);
        assert_eq!(model.layers[2].weights[0].shape(), &[4, 2]);
        assert_eq!(model.layers[2].weights[1].as_slice().unwrap(), &[8.0, 9.0]);
        assert_eq!(model.declared_input(), Some(&[Some(2), Some(2), Some(1)][..]));
    }

    #[test]
    fn rejects_short_and_trailing_weight_data() {
        let manifest = ModelManifest::from_json(MANIFEST.as_bytes()).unwrap();
        let short = le_bytes(&[0.0; 9]);
        assert!(matches!(
            SourceModel::from_parts(manifest.clone(), &short),
            Err(ModelLoadError::Weights(_))
        ));

        let long = le_bytes(&[0.0; 11]);
        assert!(matches!(
            SourceModel::from_parts(manifest.clone(), &long),
            Err(ModelLoadError::Weights(_))
        ));

        assert!(matches!(
            SourceModel::from_parts(manifest, &[0u8; 7]),
            Err(ModelLoadError::Weights(_))
        ));
    }
}
