use crate::errors::PipelineError;
use schema::{FileId, RawImage};

/// Decodes an uploaded file into an RGBA bitmap, sniffing the format from its bytes.
pub fn decode_image(file: FileId, bytes: &[u8]) -> Result<RawImage, PipelineError> {
    let _s = common::span_debug!("decode_image");
    let decode_error = |reason: String| PipelineError::Decode { file, reason };

    let image = image::load_from_memory(bytes).map_err(|e| decode_error(e.to_string()))?;
    RawImage::from_dynamic(image).map_err(|e| decode_error(e.to_string()))
}
