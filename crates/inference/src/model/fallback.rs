use crate::backend::Network;
use crate::errors::ModelLoadError;
use crate::labels::NUM_CLASSES;
use crate::model::manifest::{Activation, LayerConfig};
use schema::GRID_SIZE;

pub const FALLBACK_MODEL_NAME: &str = "garment-fallback";

/// Compact untrained classifier with the same input and output contract as
/// the garment model: `[N, 28, 28, 1]` in, ten logits out.
pub fn fallback_network(seed: u64) -> Result<Network, ModelLoadError> {
    let configs = [
        LayerConfig::Flatten {
            name: "flatten".to_string(),
        },
        LayerConfig::Dense {
            name: "hidden".to_string(),
            units: 32,
            activation: Activation::Relu,
        },
        LayerConfig::Dense {
            name: "logits".to_string(),
            units: NUM_CLASSES,
            activation: Activation::Linear,
        },
    ];

    let mut network = Network::build(FALLBACK_MODEL_NAME, &[GRID_SIZE, GRID_SIZE, 1], &configs)?;
    network.initialize(seed);
    Ok(network)
}
