use std::path::Path;

use crate::controls::{self, ControlDraft, DetectorConfig};
use crate::core::PixelBuffer;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the image helpers.
#[derive(thiserror::Error, Debug)]
pub enum ImageDetectError {
    #[error("invalid RGBA image buffer length (expected {expected} bytes, got {got})")]
    InvalidRgbaBuffer { expected: usize, got: usize },

    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: u32, height: u32 },

    #[error(transparent)]
    Image(#[from] ::image::ImageError),
}

/// Borrow an `image::RgbaImage` as a detector pixel view.
pub fn pixel_view(img: &::image::RgbaImage) -> PixelBuffer<'_> {
    PixelBuffer::new(img.width() as usize, img.height() as usize, img.as_raw())
}

/// Decode an image file of any format the `image` crate supports into RGBA8.
pub fn load_rgba(path: impl AsRef<Path>) -> Result<::image::RgbaImage, ImageDetectError> {
    Ok(::image::open(path)?.to_rgba8())
}

/// Build an `image::RgbaImage` from a raw RGBA8 buffer.
pub fn rgba_image_from_slice(
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<::image::RgbaImage, ImageDetectError> {
    let w = usize::try_from(width).ok();
    let h = usize::try_from(height).ok();
    let Some((w, h)) = w.zip(h) else {
        return Err(ImageDetectError::InvalidDimensions { width, height });
    };
    let Some(expected) = PixelBuffer::expected_len(w, h) else {
        return Err(ImageDetectError::InvalidDimensions { width, height });
    };
    if pixels.len() != expected {
        return Err(ImageDetectError::InvalidRgbaBuffer {
            expected,
            got: pixels.len(),
        });
    }
    ::image::RgbaImage::from_raw(width, height, pixels.to_vec())
        .ok_or(ImageDetectError::InvalidDimensions { width, height })
}

/// Run the control detector on a decoded image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, config), fields(width = img.width(), height = img.height()))
)]
pub fn detect_image(img: &::image::RgbaImage, config: &DetectorConfig) -> Vec<ControlDraft> {
    controls::detect(&pixel_view(img), config)
}

/// Decode `path` and run the control detector on it.
pub fn detect_path(
    path: impl AsRef<Path>,
    config: &DetectorConfig,
) -> Result<Vec<ControlDraft>, ImageDetectError> {
    let img = load_rgba(path)?;
    Ok(detect_image(&img, config))
}

/// Validate a raw RGBA8 buffer and run the control detector on it.
pub fn detect_from_rgba_u8(
    width: u32,
    height: u32,
    pixels: &[u8],
    config: &DetectorConfig,
) -> Result<Vec<ControlDraft>, ImageDetectError> {
    let img = rgba_image_from_slice(width, height, pixels)?;
    Ok(detect_image(&img, config))
}
