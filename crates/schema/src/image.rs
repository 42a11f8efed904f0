use crate::SchemaError;
use image::{DynamicImage, RgbaImage};
use ndarray::{Array2, ArrayD, Axis};
use std::fmt;
use std::sync::Arc;

/// Side length of the classifier input grid.
pub const GRID_SIZE: usize = 28;

/// Decoded RGBA8 bitmap.
///
/// Clones share the pixel buffer; it is freed when the last clone is dropped.
#[derive(Clone)]
pub struct RawImage {
    pixels: Arc<RgbaImage>,
}

impl RawImage {
    pub fn from_rgba(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self, SchemaError> {
        if width == 0 || height == 0 {
            return Err(SchemaError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(SchemaError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let pixels = RgbaImage::from_raw(width, height, bytes).ok_or(SchemaError::SizeMismatch {
            expected,
            actual: 0,
        })?;
        Ok(Self {
            pixels: Arc::new(pixels),
        })
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self, SchemaError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SchemaError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self {
            pixels: Arc::new(image.into_rgba8()),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Row-major RGBA bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// 28x28 grayscale intensities in [0, 1], row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGrid {
    values: Array2<f32>,
}

impl NormalizedGrid {
    pub fn from_array(values: Array2<f32>) -> Result<Self, SchemaError> {
        let (rows, cols) = values.dim();
        if rows != GRID_SIZE || cols != GRID_SIZE {
            return Err(SchemaError::GridShape {
                expected: GRID_SIZE,
                rows,
                cols,
            });
        }
        if let Some(((row, col), &value)) = values
            .indexed_iter()
            .find(|(_, v)| !(0.0..=1.0).contains(*v))
        {
            return Err(SchemaError::GridValue { row, col, value });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[[row, col]]
    }

    /// Single-item, single-channel NHWC batch: `[1, 28, 28, 1]`.
    pub fn to_input_tensor(&self) -> ArrayD<f32> {
        self.values
            .to_owned()
            .insert_axis(Axis(0))
            .insert_axis(Axis(3))
            .into_dyn()
    }
}
