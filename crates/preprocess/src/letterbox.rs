use crate::{Preprocess, errors::PreprocessError};
use common::span_debug;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};
use schema::RawImage;

const LETTERBOX_COLOR: u8 = 114;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Placement of a source image inside a fixed-size canvas, preserving aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// `scale = min(dst_w / src_w, dst_h / src_h)`; the scaled image is centered
    /// and never smaller than one pixel on either side.
    pub fn fit(src: (u32, u32), dst: (u32, u32)) -> Self {
        let scale = (dst.0 as f32 / src.0 as f32).min(dst.1 as f32 / src.1 as f32);
        let width = ((src.0 as f32 * scale).round() as u32).clamp(1, dst.0);
        let height = ((src.1 as f32 * scale).round() as u32).clamp(1, dst.1);

        Self {
            scale,
            width,
            height,
            offset_x: (dst.0 - width) / 2,
            offset_y: (dst.1 - height) / 2,
        }
    }

    /// Resize packed RGB `pixels` of size `src` and paste them centered on a
    /// `canvas`-sized RGB buffer filled with `fill`.
    pub fn render(
        &self,
        pixels: &[u8],
        src: (u32, u32),
        canvas: (u32, u32),
        fill: u8,
    ) -> Result<Vec<u8>, PreprocessError> {
        let _s = span_debug!("letterbox_render");

        let resized = resize_rgb(pixels, src, (self.width, self.height))?;

        let mut letterboxed = vec![fill; (canvas.0 * canvas.1 * 3) as usize];
        let row_bytes = (self.width * 3) as usize;
        let stride = (canvas.0 * 3) as usize;

        for y in 0..self.height as usize {
            let src_row = y * row_bytes;
            let dst_row = (y + self.offset_y as usize) * stride + self.offset_x as usize * 3;

            letterboxed[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized[src_row..src_row + row_bytes]);
        }

        Ok(letterboxed)
    }
}

/// Bilinear resize of a packed RGB buffer. Same-size input is copied as is.
fn resize_rgb(pixels: &[u8], src: (u32, u32), dst: (u32, u32)) -> Result<Vec<u8>, PreprocessError> {
    if src == dst {
        return Ok(pixels.to_vec());
    }

    let src_image = ImageRef::new(src.0, src.1, pixels, PixelType::U8x3)
        .map_err(|e| PreprocessError::rendering("source buffer", e))?;

    let mut resized = Image::new(dst.0, dst.1, PixelType::U8x3);

    Resizer::new()
        .resize(
            &src_image,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )
        .map_err(|e| PreprocessError::rendering("resize", e))?;

    Ok(resized.buffer().to_vec())
}

/// Alpha-composite RGBA pixels over an opaque gray level, dropping alpha.
pub(crate) fn flatten_rgba(rgba: &[u8], background: u8) -> Vec<u8> {
    let bg = background as u32;
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        let alpha = px[3] as u32;
        for &channel in &px[..3] {
            let blended = (channel as u32 * alpha + bg * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

/// Memory layout of the produced tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, H, W]`
    Nchw,
    /// `[1, H, W, 3]`
    Nhwc,
}

/// RGB letterbox with ImageNet normalization, used for the feature extractor input.
#[derive(Debug, Clone)]
pub struct FeaturePreProcessor {
    pub input_size: (u32, u32),
    pub layout: TensorLayout,
}

impl FeaturePreProcessor {
    pub fn new(input_size: (u32, u32), layout: TensorLayout) -> Self {
        Self { input_size, layout }
    }

    fn normalize(&self, rgb: &[u8]) -> Result<Array<f32, IxDyn>, PreprocessError> {
        let _s = span_debug!("normalize");

        let width = self.input_size.0 as usize;
        let height = self.input_size.1 as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in rgb.chunks_exact(3).enumerate() {
            for c in 0..3 {
                let value = (px[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                let idx = match self.layout {
                    TensorLayout::Nchw => i + c * spatial,
                    TensorLayout::Nhwc => i * 3 + c,
                };
                output[idx] = value;
            }
        }

        let shape = match self.layout {
            TensorLayout::Nchw => [1, 3, height, width],
            TensorLayout::Nhwc => [1, height, width, 3],
        };

        Array::from_shape_vec(IxDyn(&shape), output)
            .map_err(|e| PreprocessError::rendering("normalize", e))
    }
}

impl Preprocess for FeaturePreProcessor {
    fn preprocess(&self, image: &RawImage) -> Result<Array<f32, IxDyn>, PreprocessError> {
        let _s = span_debug!("feature_preprocess");

        let src = (image.width(), image.height());
        let rgb = flatten_rgba(image.as_raw(), 255);
        let letterbox = Letterbox::fit(src, self.input_size);
        let canvas = letterbox.render(&rgb, src, self.input_size, LETTERBOX_COLOR)?;

        self.normalize(&canvas)
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}
