use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A decoded, immutable RGBA pixel buffer.
///
/// Cloning is cheap: clones share the same pixels, which is how one decode
/// is handed to the memory cache, the processed-file tier and the slot.
#[derive(Clone)]
pub struct Bitmap {
    pixels: Arc<RgbaImage>,
}

impl Bitmap {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Bytes in one row of pixels.
    pub fn row_bytes(&self) -> usize {
        self.pixels.width() as usize * BYTES_PER_PIXEL
    }

    /// Decoded size in bytes (row bytes × height). Used as the memory cost.
    pub fn byte_count(&self) -> usize {
        self.row_bytes() * self.pixels.height() as usize
    }

    /// A bitmap with no pixels cannot be cached or displayed.
    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Take the pixels, copying only if another clone still shares them.
    pub fn into_image(self) -> RgbaImage {
        Arc::try_unwrap(self.pixels).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Whether both bitmaps share the same pixel buffer.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(pixels: RgbaImage) -> Self {
        Self::new(pixels)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
