pub mod mmcq;
pub mod sampler;

pub use mmcq::{Palette, Swatch, quantize};
pub use sampler::{ColorSampler, CropRegion, SamplerConfig};
