use crate::errors::{ColorError, PreprocessError};
use crate::color::mmcq;
use common::span_debug;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage, codecs::png::PngEncoder};
use schema::{DominantColor, RawImage};

/// Pixels more transparent than this are not sampled.
const MIN_ALPHA: u8 = 125;
/// Pixels with every channel above this count as background white.
const WHITE_THRESHOLD: u8 = 250;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Sample every n-th pixel of the crop.
    pub sample_stride: usize,
    /// Palette size requested from the quantizer.
    pub max_colors: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_stride: 10,
            max_colors: 5,
        }
    }
}

/// Sub-rectangle of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Central 50% x 50% region (rounded, at least 1x1), centered so both
    /// margins differ by at most one pixel.
    pub fn central(width: u32, height: u32) -> Self {
        let (x, crop_width) = centered_span(width);
        let (y, crop_height) = centered_span(height);
        Self {
            x,
            y,
            width: crop_width,
            height: crop_height,
        }
    }
}

fn centered_span(extent: u32) -> (u32, u32) {
    let len = extent.div_ceil(2).max(1);
    ((extent.saturating_sub(len) + 1) / 2, len)
}

/// Extracts one representative color from the center of an image.
///
/// Sampling the center keeps backgrounds and borders from pulling the result
/// away from the garment.
#[derive(Debug, Clone, Default)]
pub struct ColorSampler {
    config: SamplerConfig,
}

impl ColorSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Runs [`ColorSampler::extract`] on the blocking pool.
    pub async fn extract_dominant_color(&self, image: &RawImage) -> Result<DominantColor, ColorError> {
        let sampler = self.clone();
        let image = image.clone();
        tokio::task::spawn_blocking(move || sampler.extract(&image))
            .await
            .map_err(|e| ColorError::Task(e.to_string()))?
    }

    pub fn extract(&self, image: &RawImage) -> Result<DominantColor, ColorError> {
        let _s = span_debug!("extract_dominant_color");

        let crop = Self::central_crop(image)?;
        let pixels = self.sample_pixels(&crop);
        if pixels.is_empty() {
            return Err(ColorError::Extraction(
                "no opaque pixels in the sampled region".to_string(),
            ));
        }

        let sampled = pixels.len();
        let palette = mmcq::quantize(pixels, self.config.max_colors)
            .ok_or_else(|| ColorError::Extraction("quantization produced no colors".to_string()))?;
        let [r, g, b] = palette
            .dominant()
            .ok_or_else(|| ColorError::Extraction("palette is empty".to_string()))?;

        let color = DominantColor::new(r, g, b);
        tracing::trace!(
            sampled,
            palette_size = palette.swatches().len(),
            color = %color,
            "Dominant color extracted"
        );
        Ok(color)
    }

    /// Crop the central region and pass it through a lossless PNG round trip.
    pub fn central_crop(image: &RawImage) -> Result<RgbaImage, PreprocessError> {
        let region = CropRegion::central(image.width(), image.height());
        let crop = image::imageops::crop_imm(
            image.as_rgba(),
            region.x,
            region.y,
            region.width,
            region.height,
        )
        .to_image();

        reencode_lossless(&crop)
    }

    fn sample_pixels(&self, crop: &RgbaImage) -> Vec<[u8; 3]> {
        let stride = self.config.sample_stride.max(1);
        let mut colored = Vec::new();
        let mut white = Vec::new();

        for px in crop.as_raw().chunks_exact(4).step_by(stride) {
            if px[3] < MIN_ALPHA {
                continue;
            }
            let rgb = [px[0], px[1], px[2]];
            if rgb.iter().all(|&c| c > WHITE_THRESHOLD) {
                white.push(rgb);
            } else {
                colored.push(rgb);
            }
        }

        // A white garment is still a garment.
        if colored.is_empty() { white } else { colored }
    }
}

fn reencode_lossless(crop: &RgbaImage) -> Result<RgbaImage, PreprocessError> {
    let mut encoded = Vec::new();
    PngEncoder::new(&mut encoded)
        .write_image(
            crop.as_raw(),
            crop.width(),
            crop.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| PreprocessError::rendering("encode intermediate", e))?;

    let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Png)
        .map_err(|e| PreprocessError::rendering("decode intermediate", e))?;

    Ok(decoded.into_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 4]) -> RawImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        RawImage::from_rgba(width, height, pixels).unwrap()
    }

    fn exhaustive() -> ColorSampler {
        ColorSampler::new(SamplerConfig {
            sample_stride: 1,
            max_colors: 5,
        })
    }

    #[test]
    fn central_region_math() {
        assert_eq!(
            CropRegion::central(100, 80),
            CropRegion {
                x: 25,
                y: 20,
                width: 50,
                height: 40
            }
        );
        assert_eq!(
            CropRegion::central(1, 1),
            CropRegion {
                x: 0,
                y: 0,
                width: 1,
                height: 1
            }
        );
        assert_eq!(
            CropRegion::central(5, 3),
            CropRegion {
                x: 1,
                y: 1,
                width: 3,
                height: 2
            }
        );
    }

    #[test]
    fn small_regions_stay_centered() {
        for extent in 1..=40u32 {
            let region = CropRegion::central(extent, extent);
            let left = region.x;
            let right = extent - region.x - region.width;
            assert!(left.abs_diff(right) <= 1, "extent {extent}: {region:?}");
            assert!(region.width >= 1 && region.width <= extent);

            // The middle pixel is always sampled.
            let middle = extent / 2;
            assert!(
                (region.x..region.x + region.width).contains(&middle),
                "extent {extent}: {region:?}"
            );
        }
    }

    #[test]
    fn solid_red_is_exact() {
        let image = image_from_fn(100, 100, |_, _| [255, 0, 0, 255]);
        let color = ColorSampler::default().extract(&image).unwrap();
        assert_eq!(color.to_hex(), "#ff0000");
    }

    #[test]
    fn border_is_ignored() {
        let image = image_from_fn(100, 100, |x, y| {
            if (25..75).contains(&x) && (25..75).contains(&y) {
                [255, 0, 0, 255]
            } else {
                [0, 0, 255, 255]
            }
        });
        assert_eq!(exhaustive().extract(&image).unwrap().to_hex(), "#ff0000");
    }

    #[test]
    fn majority_of_center_wins() {
        let image = image_from_fn(100, 100, |x, _| {
            if x < 62 { [0, 255, 0, 255] } else { [0, 0, 0, 255] }
        });
        assert_eq!(exhaustive().extract(&image).unwrap().to_hex(), "#00ff00");
    }

    #[test]
    fn white_garment_falls_back_to_white() {
        let image = image_from_fn(40, 40, |_, _| [255, 255, 255, 255]);
        assert_eq!(exhaustive().extract(&image).unwrap().to_hex(), "#ffffff");
    }

    #[test]
    fn transparent_image_fails_explicitly() {
        let image = image_from_fn(40, 40, |_, _| [255, 0, 0, 0]);
        let err = exhaustive().extract(&image).unwrap_err();
        assert!(matches!(err, ColorError::Extraction(_)), "got {err:?}");
    }

    #[test]
    fn one_pixel_image() {
        let image = image_from_fn(1, 1, |_, _| [12, 34, 56, 255]);
        assert_eq!(exhaustive().extract(&image).unwrap().to_hex(), "#0c2238");
    }

    #[test]
    fn crop_survives_png_round_trip() {
        let image = image_from_fn(8, 8, |x, y| [x as u8 * 30, y as u8 * 30, 7, 255]);
        let crop = ColorSampler::central_crop(&image).unwrap();
        assert_eq!(crop.dimensions(), (4, 4));
        assert_eq!(crop.get_pixel(0, 0).0, [60, 60, 7, 255]);
        assert_eq!(crop.get_pixel(3, 3).0, [150, 150, 7, 255]);
    }

    #[tokio::test]
    async fn async_extraction_matches_sync() {
        let image = image_from_fn(64, 48, |x, y| [(x * 4) as u8, (y * 5) as u8, 90, 255]);
        let sampler = ColorSampler::default();
        let sync = sampler.extract(&image).unwrap();
        let from_task = sampler.extract_dominant_color(&image).await.unwrap();
        assert_eq!(sync, from_task);
    }
}
