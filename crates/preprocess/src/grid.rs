use crate::letterbox::{Letterbox, flatten_rgba};
use crate::{Preprocess, errors::PreprocessError};
use common::span_debug;
use ndarray::{Array, Array2, IxDyn};
use schema::{GRID_SIZE, NormalizedGrid, RawImage};

const BACKGROUND: u8 = 255;
const GRID: (u32, u32) = (GRID_SIZE as u32, GRID_SIZE as u32);

/// Rasterizes images into the classifier's 28x28 grayscale grid.
///
/// The image is scaled by `min(28 / width, 28 / height)`, centered on a white
/// canvas and converted to the unweighted mean of R, G and B over 255.
/// Every call allocates its own canvas.
#[derive(Debug, Default, Clone, Copy)]
pub struct GridPreprocessor;

impl GridPreprocessor {
    pub fn to_grid(&self, image: &RawImage) -> Result<NormalizedGrid, PreprocessError> {
        let _s = span_debug!("to_grid");

        let src = (image.width(), image.height());
        let rgb = flatten_rgba(image.as_raw(), BACKGROUND);
        let letterbox = Letterbox::fit(src, GRID);

        tracing::trace!(
            width = src.0,
            height = src.1,
            scale = letterbox.scale,
            offset_x = letterbox.offset_x,
            offset_y = letterbox.offset_y,
            "Letterboxing into grid"
        );

        let canvas = letterbox.render(&rgb, src, GRID, BACKGROUND)?;

        let intensities: Vec<f32> = canvas
            .chunks_exact(3)
            .map(|px| (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0 / 255.0)
            .map(|v| v.clamp(0.0, 1.0))
            .collect();

        let values = Array2::from_shape_vec((GRID_SIZE, GRID_SIZE), intensities)
            .map_err(|e| PreprocessError::rendering("read back", e))?;

        NormalizedGrid::from_array(values).map_err(|e| PreprocessError::rendering("read back", e))
    }
}

/// Convenience wrapper around [`GridPreprocessor::to_grid`].
pub fn to_grid(image: &RawImage) -> Result<NormalizedGrid, PreprocessError> {
    GridPreprocessor.to_grid(image)
}

impl Preprocess for GridPreprocessor {
    fn preprocess(&self, image: &RawImage) -> Result<Array<f32, IxDyn>, PreprocessError> {
        Ok(self.to_grid(image)?.to_input_tensor())
    }

    fn input_size(&self) -> (u32, u32) {
        GRID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RawImage {
        RawImage::from_rgba(width, height, rgba.repeat((width * height) as usize)).unwrap()
    }

    #[test]
    fn any_aspect_ratio_gives_28x28_in_range() {
        let sizes = [(1, 1), (28, 28), (800, 600), (600, 800), (1, 500), (500, 1), (3, 7)];
        for (width, height) in sizes {
            let grid = to_grid(&solid(width, height, [40, 90, 200, 255])).unwrap();
            assert_eq!(grid.values().dim(), (28, 28), "{}x{}", width, height);
            assert!(
                grid.values().iter().all(|v| (0.0..=1.0).contains(v)),
                "{}x{} produced out-of-range values",
                width,
                height
            );
        }
    }

    #[test]
    fn native_grayscale_round_trips() {
        let mut pixels = Vec::with_capacity(28 * 28 * 4);
        for y in 0..28u32 {
            for x in 0..28u32 {
                let v = ((x * 9 + y * 3) % 256) as u8;
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let image = RawImage::from_rgba(28, 28, pixels).unwrap();
        let grid = to_grid(&image).unwrap();

        for y in 0..28 {
            for x in 0..28 {
                let expected = ((x * 9 + y * 3) % 256) as f32 / 255.0;
                assert!(
                    (grid.get(y, x) - expected).abs() < 1e-3,
                    "({}, {}): {} vs {}",
                    y,
                    x,
                    grid.get(y, x),
                    expected
                );
            }
        }
    }

    #[test]
    fn wide_image_is_centered_on_white() {
        // 56x28 black scales to 28x14, leaving 7 white rows above and below.
        let grid = to_grid(&solid(56, 28, [0, 0, 0, 255])).unwrap();

        for x in 0..28 {
            assert_eq!(grid.get(0, x), 1.0);
            assert_eq!(grid.get(6, x), 1.0);
            assert_eq!(grid.get(7, x), 0.0);
            assert_eq!(grid.get(20, x), 0.0);
            assert_eq!(grid.get(21, x), 1.0);
            assert_eq!(grid.get(27, x), 1.0);
        }
    }

    #[test]
    fn tall_image_is_centered_horizontally() {
        let grid = to_grid(&solid(14, 28, [0, 0, 0, 255])).unwrap();
        assert_eq!(grid.get(14, 6), 1.0);
        assert_eq!(grid.get(14, 7), 0.0);
        assert_eq!(grid.get(14, 20), 0.0);
        assert_eq!(grid.get(14, 21), 1.0);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let grid = to_grid(&solid(28, 28, [0, 0, 0, 0])).unwrap();
        assert!(grid.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn grayscale_is_unweighted_mean() {
        let grid = to_grid(&solid(28, 28, [255, 0, 0, 255])).unwrap();
        assert!((grid.get(10, 10) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn preprocess_trait_yields_nhwc_tensor() {
        let preprocessor = GridPreprocessor;
        let tensor = preprocessor.preprocess(&solid(10, 20, [0, 0, 0, 255])).unwrap();
        assert_eq!(tensor.shape(), &[1, 28, 28, 1]);
        assert_eq!(preprocessor.input_size(), (28, 28));
    }
}
