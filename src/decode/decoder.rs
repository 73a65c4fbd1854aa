//! Raw-bytes decoding backends.

use std::io::Cursor;

use image::{ImageError, ImageReader, RgbaImage};

use crate::error::DecodeError;

/// Turns encoded image bytes into pixels.
///
/// Implementations are called from blocking worker threads and must be
/// safe to share between concurrent decodes.
pub trait DecodeBackend: Send + Sync {
    /// Read the natural dimensions without decoding pixels.
    fn probe_size(&self, data: &[u8]) -> Result<(u32, u32), DecodeError>;

    /// Decode at `1 / sample` of the natural size (floor division, at
    /// least one pixel per axis).
    fn decode(&self, data: &[u8], sample: u32) -> Result<RgbaImage, DecodeError>;
}

/// [`DecodeBackend`] built on the `image` crate (JPEG and PNG).
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl RasterDecoder {
    pub fn new() -> Self {
        Self
    }

    fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, DecodeError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
        if reader.format().is_none() {
            return Err(DecodeError::UnsupportedFormat(
                "unrecognised signature".to_string(),
            ));
        }
        Ok(reader)
    }
}

impl DecodeBackend for RasterDecoder {
    fn probe_size(&self, data: &[u8]) -> Result<(u32, u32), DecodeError> {
        let (width, height) = Self::reader(data)?
            .into_dimensions()
            .map_err(map_image_error)?;
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyImage);
        }
        Ok((width, height))
    }

    fn decode(&self, data: &[u8], sample: u32) -> Result<RgbaImage, DecodeError> {
        let image = Self::reader(data)?.decode().map_err(map_image_error)?;
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyImage);
        }

        if sample <= 1 {
            return Ok(image.into_rgba8());
        }

        let coarse = image.thumbnail_exact((width / sample).max(1), (height / sample).max(1));
        drop(image);
        Ok(coarse.into_rgba8())
    }
}

fn map_image_error(err: ImageError) -> DecodeError {
    match err {
        ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}
