use crate::errors::ModelLoadError;
use crate::model::manifest::{Activation, LayerConfig, Padding};
use ndarray::{Array1, Array2, Array4, ArrayD, Axis, Ix1, Ix2, Ix4, ShapeError, s};

#[derive(Debug, Clone)]
pub struct Conv2d {
    pub name: String,
    /// `[kh, kw, in_channels, filters]`
    pub kernel: Array4<f32>,
    pub bias: Array1<f32>,
    pub strides: [usize; 2],
    pub padding: Padding,
    pub activation: Activation,
}

#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pub name: String,
    pub pool: [usize; 2],
    pub strides: [usize; 2],
}

#[derive(Debug, Clone)]
pub struct Dense {
    pub name: String,
    /// `[inputs, units]`
    pub kernel: Array2<f32>,
    pub bias: Array1<f32>,
    pub activation: Activation,
}

/// A runnable layer. Image tensors are NHWC.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Flatten { name: String },
    Dense(Dense),
    /// Identity at inference time.
    Dropout { name: String },
}

/// Output size and leading padding along one spatial axis.
fn window_geometry(
    input: usize,
    window: usize,
    stride: usize,
    padding: Padding,
) -> Option<(usize, usize)> {
    if stride == 0 || window == 0 || input == 0 {
        return None;
    }
    match padding {
        Padding::Valid => input
            .checked_sub(window)
            .map(|rest| (rest / stride + 1, 0)),
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = ((out - 1) * stride + window).saturating_sub(input);
            Some((out, needed / 2))
        }
    }
}

fn weight_error(e: ShapeError) -> ModelLoadError {
    ModelLoadError::Weights(e.to_string())
}

fn shape_error(config: &LayerConfig, input: &[usize], reason: impl Into<String>) -> ModelLoadError {
    ModelLoadError::Shape {
        layer: config.name().to_string(),
        input: input.to_vec(),
        reason: reason.into(),
    }
}

impl Layer {
    /// Builds a zero-weighted layer for `input` (shape without batch) and
    /// returns it with its output shape.
    pub fn from_config(
        config: &LayerConfig,
        input: &[usize],
    ) -> Result<(Layer, Vec<usize>), ModelLoadError> {
        match config {
            LayerConfig::InputLayer { name, .. } => {
                Err(ModelLoadError::UnsupportedLayer(format!("{name} (nested input layer)")))
            }
            LayerConfig::Conv2D {
                name,
                filters,
                kernel_size,
                strides,
                padding,
                activation,
            } => {
                let &[h, w, c] = input else {
                    return Err(shape_error(config, input, "expected [height, width, channels]"));
                };
                let (oh, _) = window_geometry(h, kernel_size[0], strides[0], *padding)
                    .ok_or_else(|| shape_error(config, input, "kernel taller than input"))?;
                let (ow, _) = window_geometry(w, kernel_size[1], strides[1], *padding)
                    .ok_or_else(|| shape_error(config, input, "kernel wider than input"))?;
                if *filters == 0 {
                    return Err(shape_error(config, input, "zero filters"));
                }

                let layer = Layer::Conv2d(Conv2d {
                    name: name.clone(),
                    kernel: Array4::zeros((kernel_size[0], kernel_size[1], c, *filters)),
                    bias: Array1::zeros(*filters),
                    strides: *strides,
                    padding: *padding,
                    activation: *activation,
                });
                Ok((layer, vec![oh, ow, *filters]))
            }
            LayerConfig::MaxPooling2D {
                name,
                pool_size,
                strides,
            } => {
                let &[h, w, c] = input else {
                    return Err(shape_error(config, input, "expected [height, width, channels]"));
                };
                let strides = strides.unwrap_or(*pool_size);
                let (oh, _) = window_geometry(h, pool_size[0], strides[0], Padding::Valid)
                    .ok_or_else(|| shape_error(config, input, "pool taller than input"))?;
                let (ow, _) = window_geometry(w, pool_size[1], strides[1], Padding::Valid)
                    .ok_or_else(|| shape_error(config, input, "pool wider than input"))?;

                let layer = Layer::MaxPool2d(MaxPool2d {
                    name: name.clone(),
                    pool: *pool_size,
                    strides,
                });
                Ok((layer, vec![oh, ow, c]))
            }
            LayerConfig::Flatten { name } => Ok((
                Layer::Flatten { name: name.clone() },
                vec![input.iter().product()],
            )),
            LayerConfig::Dense {
                name,
                units,
                activation,
            } => {
                let &[inputs] = input else {
                    return Err(shape_error(config, input, "dense layers need a flat input"));
                };
                let layer = Layer::Dense(Dense {
                    name: name.clone(),
                    kernel: Array2::zeros((inputs, *units)),
                    bias: Array1::zeros(*units),
                    activation: *activation,
                });
                Ok((layer, vec![*units]))
            }
            LayerConfig::Dropout { name, .. } => {
                Ok((Layer::Dropout { name: name.clone() }, input.to_vec()))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Layer::Conv2d(l) => &l.name,
            Layer::MaxPool2d(l) => &l.name,
            Layer::Dense(l) => &l.name,
            Layer::Flatten { name } | Layer::Dropout { name } => name,
        }
    }

    /// Shapes of the weight tensors this layer owns, kernel first.
    pub fn weight_shapes(&self) -> Vec<Vec<usize>> {
        match self {
            Layer::Conv2d(l) => vec![l.kernel.shape().to_vec(), l.bias.shape().to_vec()],
            Layer::Dense(l) => vec![l.kernel.shape().to_vec(), l.bias.shape().to_vec()],
            _ => Vec::new(),
        }
    }

    /// Replaces the layer's weights. Shapes must match [`Layer::weight_shapes`].
    pub fn set_weights(&mut self, weights: Vec<ArrayD<f32>>) -> Result<(), ModelLoadError> {
        let expected = self.weight_shapes();
        if weights.len() != expected.len() {
            return Err(ModelLoadError::Weights(format!(
                "layer '{}' takes {} weight tensors, got {}",
                self.name(),
                expected.len(),
                weights.len()
            )));
        }
        for (tensor, shape) in weights.iter().zip(&expected) {
            if tensor.shape() != shape.as_slice() {
                return Err(ModelLoadError::WeightShape {
                    layer: self.name().to_string(),
                    expected: shape.clone(),
                    actual: tensor.shape().to_vec(),
                });
            }
        }

        let mut weights = weights.into_iter();
        match self {
            Layer::Conv2d(l) => {
                if let (Some(kernel), Some(bias)) = (weights.next(), weights.next()) {
                    l.kernel = kernel.into_dimensionality::<Ix4>().map_err(weight_error)?;
                    l.bias = bias.into_dimensionality::<Ix1>().map_err(weight_error)?;
                }
            }
            Layer::Dense(l) => {
                if let (Some(kernel), Some(bias)) = (weights.next(), weights.next()) {
                    l.kernel = kernel.into_dimensionality::<Ix2>().map_err(weight_error)?;
                    l.bias = bias.into_dimensionality::<Ix1>().map_err(weight_error)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn forward(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        match self {
            Layer::Conv2d(conv) => conv.forward(input),
            Layer::MaxPool2d(pool) => pool.forward(input),
            Layer::Dense(dense) => dense.forward(input),
            Layer::Flatten { .. } => {
                let batch = input.shape().first().copied().unwrap_or(1);
                let rest: usize = input.shape().iter().skip(1).product();
                Ok(input
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order(vec![batch, rest])?)
            }
            Layer::Dropout { .. } => Ok(input),
        }
    }

    /// Kernel and bias for weighted layers.
    pub(crate) fn params_mut(&mut self) -> Option<(&mut [f32], usize, usize, &mut [f32])> {
        match self {
            Layer::Conv2d(l) => {
                let (kh, kw, c, f) = l.kernel.dim();
                let kernel = l.kernel.as_slice_mut()?;
                Some((kernel, kh * kw * c, kh * kw * f, l.bias.as_slice_mut()?))
            }
            Layer::Dense(l) => {
                let (inputs, units) = l.kernel.dim();
                let kernel = l.kernel.as_slice_mut()?;
                Some((kernel, inputs, units, l.bias.as_slice_mut()?))
            }
            _ => None,
        }
    }
}

impl Activation {
    /// Applies the activation in place. Softmax normalizes over the last axis.
    pub fn apply(&self, x: &mut ArrayD<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => x.mapv_inplace(f32::tanh),
            Activation::Softmax => {
                let Some(last) = x.ndim().checked_sub(1) else {
                    return;
                };
                for mut lane in x.lanes_mut(Axis(last)) {
                    let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    lane.mapv_inplace(|v| (v - max).exp());
                    let sum = lane.sum();
                    if sum > 0.0 {
                        lane.mapv_inplace(|v| v / sum);
                    }
                }
            }
        }
    }
}

impl Conv2d {
    fn forward(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let x = input.into_dimensionality::<Ix4>()?;
        let (batch, h, w, channels) = x.dim();
        let (kh, kw, kc, filters) = self.kernel.dim();
        anyhow::ensure!(
            channels == kc,
            "layer '{}' expects {} channels, got {}",
            self.name,
            kc,
            channels
        );

        let (oh, pad_top) = window_geometry(h, kh, self.strides[0], self.padding)
            .ok_or_else(|| anyhow::anyhow!("layer '{}': input height {} too small", self.name, h))?;
        let (ow, pad_left) = window_geometry(w, kw, self.strides[1], self.padding)
            .ok_or_else(|| anyhow::anyhow!("layer '{}': input width {} too small", self.name, w))?;

        let mut out = Array4::<f32>::zeros((batch, oh, ow, filters));
        let mut acc = Array1::<f32>::zeros(filters);

        for b in 0..batch {
            for oy in 0..oh {
                for ox in 0..ow {
                    acc.assign(&self.bias);
                    for ky in 0..kh {
                        let Some(iy) = (oy * self.strides[0] + ky).checked_sub(pad_top) else {
                            continue;
                        };
                        if iy >= h {
                            continue;
                        }
                        for kx in 0..kw {
                            let Some(ix) = (ox * self.strides[1] + kx).checked_sub(pad_left) else {
                                continue;
                            };
                            if ix >= w {
                                continue;
                            }
                            for c in 0..channels {
                                let v = x[[b, iy, ix, c]];
                                if v != 0.0 {
                                    acc.scaled_add(v, &self.kernel.slice(s![ky, kx, c, ..]));
                                }
                            }
                        }
                    }
                    out.slice_mut(s![b, oy, ox, ..]).assign(&acc);
                }
            }
        }

        let mut out = out.into_dyn();
        self.activation.apply(&mut out);
        Ok(out)
    }
}

impl MaxPool2d {
    fn forward(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let x = input.into_dimensionality::<Ix4>()?;
        let (batch, h, w, channels) = x.dim();
        let [ph, pw] = self.pool;
        let [sh, sw] = self.strides;

        let (oh, _) = window_geometry(h, ph, sh, Padding::Valid)
            .ok_or_else(|| anyhow::anyhow!("layer '{}': input height {} too small", self.name, h))?;
        let (ow, _) = window_geometry(w, pw, sw, Padding::Valid)
            .ok_or_else(|| anyhow::anyhow!("layer '{}': input width {} too small", self.name, w))?;

        let mut out = Array4::<f32>::from_elem((batch, oh, ow, channels), f32::NEG_INFINITY);
        for b in 0..batch {
            for oy in 0..oh {
                for ox in 0..ow {
                    let window = x.slice(s![
                        b,
                        oy * sh..oy * sh + ph,
                        ox * sw..ox * sw + pw,
                        ..
                    ]);
                    for c in 0..channels {
                        let max = window
                            .index_axis(Axis(2), c)
                            .fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                        out[[b, oy, ox, c]] = max;
                    }
                }
            }
        }
        Ok(out.into_dyn())
    }
}

impl Dense {
    fn forward(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let x = input.into_dimensionality::<Ix2>()?;
        anyhow::ensure!(
            x.ncols() == self.kernel.nrows(),
            "layer '{}' expects {} inputs, got {}",
            self.name,
            self.kernel.nrows(),
            x.ncols()
        );
        let mut out = (x.dot(&self.kernel) + &self.bias).into_dyn();
        self.activation.apply(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, array};

    fn dense_config(units: usize, activation: Activation) -> LayerConfig {
        LayerConfig::Dense {
            name: "dense".to_string(),
            units,
            activation,
        }
    }

    #[test]
    fn valid_and_same_geometry() {
        assert_eq!(window_geometry(28, 3, 1, Padding::Valid), Some((26, 0)));
        assert_eq!(window_geometry(26, 2, 2, Padding::Valid), Some((13, 0)));
        assert_eq!(window_geometry(28, 3, 1, Padding::Same), Some((28, 1)));
        assert_eq!(window_geometry(2, 3, 1, Padding::Valid), None);
    }

    #[test]
    fn shape_inference_through_a_small_cnn() {
        let conv = LayerConfig::Conv2D {
            name: "conv".to_string(),
            filters: 8,
            kernel_size: [3, 3],
            strides: [1, 1],
            padding: Padding::Valid,
            activation: Activation::Relu,
        };
        let (_, shape) = Layer::from_config(&conv, &[28, 28, 1]).unwrap();
        assert_eq!(shape, vec![26, 26, 8]);

        let pool = LayerConfig::MaxPooling2D {
            name: "pool".to_string(),
            pool_size: [2, 2],
            strides: None,
        };
        let (_, shape) = Layer::from_config(&pool, &shape).unwrap();
        assert_eq!(shape, vec![13, 13, 8]);

        let flatten = LayerConfig::Flatten {
            name: "flat".to_string(),
        };
        let (_, shape) = Layer::from_config(&flatten, &shape).unwrap();
        assert_eq!(shape, vec![13 * 13 * 8]);
    }

    #[test]
    fn dense_rejects_spatial_input() {
        let err = Layer::from_config(&dense_config(4, Activation::Linear), &[28, 28, 1]).unwrap_err();
        assert!(matches!(err, ModelLoadError::Shape { .. }));
    }

    #[test]
    fn set_weights_checks_shapes() {
        let (mut layer, _) = Layer::from_config(&dense_config(2, Activation::Linear), &[3]).unwrap();
        assert_eq!(layer.weight_shapes(), vec![vec![3, 2], vec![2]]);

        let wrong = vec![ArrayD::zeros(IxDyn(&[2, 3])), ArrayD::zeros(IxDyn(&[2]))];
        assert!(matches!(
            layer.set_weights(wrong),
            Err(ModelLoadError::WeightShape { .. })
        ));

        let missing = vec![ArrayD::zeros(IxDyn(&[3, 2]))];
        assert!(matches!(
            layer.set_weights(missing),
            Err(ModelLoadError::Weights(_))
        ));
    }

    #[test]
    fn dense_forward_applies_bias_and_relu() {
        let (mut layer, _) = Layer::from_config(&dense_config(2, Activation::Relu), &[2]).unwrap();
        layer
            .set_weights(vec![
                array![[1.0f32, -1.0], [2.0, -2.0]].into_dyn(),
                array![0.5f32, 0.0].into_dyn(),
            ])
            .unwrap();

        let out = layer.forward(array![[1.0f32, 1.0]].into_dyn()).unwrap();
        assert_eq!(out.shape(), &[1, 2]);
        assert_eq!(out[[0, 0]], 3.5);
        assert_eq!(out[[0, 1]], 0.0);
    }

    #[test]
    fn conv_sums_the_window() {
        let conv = LayerConfig::Conv2D {
            name: "conv".to_string(),
            filters: 1,
            kernel_size: [2, 2],
            strides: [1, 1],
            padding: Padding::Valid,
            activation: Activation::Linear,
        };
        let (mut layer, shape) = Layer::from_config(&conv, &[3, 3, 1]).unwrap();
        assert_eq!(shape, vec![2, 2, 1]);
        layer
            .set_weights(vec![
                ArrayD::ones(IxDyn(&[2, 2, 1, 1])),
                ArrayD::zeros(IxDyn(&[1])),
            ])
            .unwrap();

        let input = ArrayD::from_shape_vec(
            IxDyn(&[1, 3, 3, 1]),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        )
        .unwrap();
        let out = layer.forward(input).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2, 1]);
        assert_eq!(out[[0, 0, 0, 0]], 12.0);
        assert_eq!(out[[0, 1, 1, 0]], 28.0);
    }

    #[test]
    fn max_pool_picks_window_maximum() {
        let pool = Layer::MaxPool2d(MaxPool2d {
            name: "pool".to_string(),
            pool: [2, 2],
            strides: [2, 2],
        });
        let input = ArrayD::from_shape_vec(
            IxDyn(&[1, 2, 4, 1]),
            vec![1.0, 5.0, 2.0, 0.0, 3.0, 4.0, 8.0, 1.0],
        )
        .unwrap();
        let out = pool.forward(input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2, 1]);
        assert_eq!(out[[0, 0, 0, 0]], 5.0);
        assert_eq!(out[[0, 0, 1, 0]], 8.0);
    }

    #[test]
    fn softmax_normalizes_last_axis() {
        let mut x = array![[1.0f32, 2.0, 3.0], [0.0, 0.0, 0.0]].into_dyn();
        Activation::Softmax.apply(&mut x);
        for row in x.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!(x[[0, 2]] > x[[0, 1]]);
        assert!((x[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
    }
}
