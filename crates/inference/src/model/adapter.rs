//! Rebuilds a stored model around an explicit input shape.
//!
//! Stored topologies can carry an input layer whose shape is missing or
//! partially unknown. The adapter drops that layer, builds the remaining
//! layers against a known input shape and copies the stored weights across.
//! Layer `i` of the rebuilt network takes the weights of stored layer `i + 1`,
//! so the stored model must have exactly one more layer than the network.

use crate::backend::Network;
use crate::errors::ModelLoadError;
use crate::model::manifest::{LayerConfig, SourceModel};
use ndarray::ArrayD;

#[derive(Debug, Clone)]
pub struct ModelAdapter {
    input_shape: Vec<usize>,
}

impl ModelAdapter {
    /// `input_shape` excludes the batch dimension, e.g. `[28, 28, 1]`.
    pub fn new(input_shape: &[usize]) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
        }
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn adapt(&self, name: &str, source: SourceModel) -> Result<Network, ModelLoadError> {
        let Some(first) = source.layers.first() else {
            return Err(ModelLoadError::AdapterContract(
                "stored model has no layers".to_string(),
            ));
        };
        if !first.config.is_input() {
            return Err(ModelLoadError::AdapterContract(format!(
                "stored model must start with an input layer, found '{}'",
                first.config.name()
            )));
        }
        self.check_declared_input(&source)?;

        let configs: Vec<LayerConfig> = source.layers[1..]
            .iter()
            .map(|l| l.config.clone())
            .collect();
        let mut network = Network::build(name, &self.input_shape, &configs)?;

        let weights = source.layers.into_iter().map(|l| l.weights).collect();
        transplant_weights(weights, &mut network)?;

        tracing::debug!(
            model = name,
            layers = network.layers().len(),
            input_shape = ?self.input_shape,
            output_shape = ?network.output_shape(),
            "Model rebuilt with explicit input shape"
        );
        Ok(network)
    }

    /// Known dimensions of a declared input must agree with the explicit shape.
    fn check_declared_input(&self, source: &SourceModel) -> Result<(), ModelLoadError> {
        let Some(declared) = source.declared_input() else {
            return Ok(());
        };
        let compatible = declared.len() == self.input_shape.len()
            && declared
                .iter()
                .zip(&self.input_shape)
                .all(|(d, e)| d.is_none_or(|d| d == *e));
        if compatible {
            Ok(())
        } else {
            Err(ModelLoadError::AdapterContract(format!(
                "declared input {:?} conflicts with {:?}",
                declared, self.input_shape
            )))
        }
    }
}

/// Copies per-layer weights from a stored model into `target`.
///
/// `source` holds one entry per stored layer. It must have exactly
/// `target.layers().len() + 1` entries, the first (the input layer) must be
/// empty, and `target` layer `i` receives `source[i + 1]`.
pub fn transplant_weights(
    source: Vec<Vec<ArrayD<f32>>>,
    target: &mut Network,
) -> Result<(), ModelLoadError> {
    let expected = target.layers().len() + 1;
    if source.len() != expected {
        return Err(ModelLoadError::AdapterContract(format!(
            "stored model has {} layers, rebuilt network needs {}",
            source.len(),
            expected
        )));
    }

    let mut source = source.into_iter();
    if source.next().is_some_and(|input| !input.is_empty()) {
        return Err(ModelLoadError::AdapterContract(
            "input layer carries weights".to_string(),
        ));
    }

    for (layer, weights) in target.layers_mut().iter_mut().zip(source) {
        layer.set_weights(weights)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceBackend;
    use crate::model::manifest::{Activation, SourceLayer};
    use ndarray::IxDyn;

    fn input_layer(shape: Option<Vec<Option<usize>>>) -> SourceLayer {
        SourceLayer {
            config: LayerConfig::InputLayer {
                name: "input".to_string(),
                batch_input_shape: shape,
            },
            weights: Vec::new(),
        }
    }

    fn dense_layer(inputs: usize, units: usize, fill: f32) -> SourceLayer {
        SourceLayer {
            config: LayerConfig::Dense {
                name: format!("dense_{units}"),
                units,
                activation: Activation::Linear,
            },
            weights: vec![
                ArrayD::from_elem(IxDyn(&[inputs, units]), fill),
                ArrayD::zeros(IxDyn(&[units])),
            ],
        }
    }

    fn flatten_layer() -> SourceLayer {
        SourceLayer {
            config: LayerConfig::Flatten {
                name: "flatten".to_string(),
            },
            weights: Vec::new(),
        }
    }

    #[test]
    fn copies_weights_from_the_next_stored_layer() {
        let source = SourceModel {
            layers: vec![
                input_layer(Some(vec![None, None, None, Some(1)])),
                flatten_layer(),
                dense_layer(4, 2, 0.5),
            ],
        };

        let network = ModelAdapter::new(&[2, 2, 1]).adapt("garment", source).unwrap();
        assert_eq!(network.layers().len(), 2);
        assert_eq!(network.input_shape(), &[2, 2, 1]);

        let input = ArrayD::from_elem(IxDyn(&[1, 2, 2, 1]), 1.0);
        let out = network.infer(&input).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[2.0, 2.0]);
    }

    #[test]
    fn rejects_a_missing_input_layer() {
        let source = SourceModel {
            layers: vec![flatten_layer(), dense_layer(4, 2, 0.5)],
        };
        let err = ModelAdapter::new(&[2, 2, 1]).adapt("garment", source).unwrap_err();
        assert!(matches!(err, ModelLoadError::AdapterContract(_)));
    }

    #[test]
    fn rejects_conflicting_declared_input() {
        let source = SourceModel {
            layers: vec![
                input_layer(Some(vec![None, Some(32), Some(32), Some(1)])),
                flatten_layer(),
                dense_layer(4, 2, 0.5),
            ],
        };
        let err = ModelAdapter::new(&[2, 2, 1]).adapt("garment", source).unwrap_err();
        assert!(matches!(err, ModelLoadError::AdapterContract(_)));
    }

    #[test]
    fn weight_shape_mismatch_surfaces_as_load_error() {
        let source = SourceModel {
            layers: vec![input_layer(None), flatten_layer(), dense_layer(9, 2, 0.5)],
        };
        let err = ModelAdapter::new(&[2, 2, 1]).adapt("garment", source).unwrap_err();
        assert!(matches!(err, ModelLoadError::WeightShape { .. }));
    }

    #[test]
    fn transplant_requires_one_extra_source_layer() {
        let configs = vec![LayerConfig::Flatten {
            name: "flatten".to_string(),
        }];
        let mut network = Network::build("n", &[2, 2, 1], &configs).unwrap();

        let err = transplant_weights(vec![Vec::new()], &mut network).unwrap_err();
        assert!(matches!(err, ModelLoadError::AdapterContract(_)));

        let err = transplant_weights(vec![Vec::new(); 3], &mut network).unwrap_err();
        assert!(matches!(err, ModelLoadError::AdapterContract(_)));

        transplant_weights(vec![Vec::new(); 2], &mut network).unwrap();
    }

    #[test]
    fn transplant_rejects_weights_on_the_input_layer() {
        let configs = vec![LayerConfig::Flatten {
            name: "flatten".to_string(),
        }];
        let mut network = Network::build("n", &[2, 2, 1], &configs).unwrap();
        let source = vec![vec![ArrayD::zeros(IxDyn(&[1]))], Vec::new()];
        assert!(matches!(
            transplant_weights(source, &mut network),
            Err(ModelLoadError::AdapterContract(_))
        ));
    }
}
