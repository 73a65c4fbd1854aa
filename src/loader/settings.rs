//! Per-request settings.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::VariantKey;
use crate::decode::SizeMode;

use super::processor::ImageProcessor;

/// Which cache tiers a request reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CacheFlags {
    pub use_memory: bool,
    pub use_file_processed: bool,
    pub use_file_original: bool,
}

impl CacheFlags {
    /// Every tier enabled.
    pub const ALL: CacheFlags = CacheFlags {
        use_memory: true,
        use_file_processed: true,
        use_file_original: true,
    };

    /// No tier enabled: always fetch and decode.
    pub const NONE: CacheFlags = CacheFlags {
        use_memory: false,
        use_file_processed: false,
        use_file_original: false,
    };

    pub const MEMORY_ONLY: CacheFlags = CacheFlags {
        use_memory: true,
        use_file_processed: false,
        use_file_original: false,
    };
}

impl Default for CacheFlags {
    fn default() -> Self {
        CacheFlags::ALL
    }
}

/// How an image should be sized, processed and cached.
///
/// Built with chained setters:
///
/// ```
/// use image_loader::decode::SizeMode;
/// use image_loader::loader::ImageSettings;
///
/// let settings = ImageSettings::new()
///     .size(200, 120)
///     .size_mode(SizeMode::Fit)
///     .scale_up(true);
/// assert_eq!(settings.variant_key().width, 200);
/// ```
#[derive(Clone)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    pub downsample_by: u32,
    pub size_mode: SizeMode,
    pub scale_up: bool,
    pub processor: Option<Arc<dyn ImageProcessor>>,
    pub flags: CacheFlags,
    /// Per-request debug logging; `None` follows the loader default
    pub logging: Option<bool>,
}

impl ImageSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn downsample_by(mut self, extra: u32) -> Self {
        self.downsample_by = extra;
        self
    }

    pub fn size_mode(mut self, mode: SizeMode) -> Self {
        self.size_mode = mode;
        self
    }

    pub fn scale_up(mut self, scale_up: bool) -> Self {
        self.scale_up = scale_up;
        self
    }

    pub fn processor(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn flags(mut self, flags: CacheFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn logging(mut self, on: bool) -> Self {
        self.logging = Some(on);
        self
    }

    /// The variant these settings render.
    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            width: self.width,
            height: self.height,
            downsample: self.downsample_by,
            size_mode: self.size_mode,
            scale_up: self.scale_up,
            processor: self.processor.as_ref().map(|p| Arc::from(p.id())),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            downsample_by: 0,
            size_mode: SizeMode::Fill,
            scale_up: false,
            processor: None,
            flags: CacheFlags::default(),
            logging: None,
        }
    }
}

impl fmt::Debug for ImageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSettings")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("downsample_by", &self.downsample_by)
            .field("size_mode", &self.size_mode)
            .field("scale_up", &self.scale_up)
            .field("processor", &self.processor.as_ref().map(|p| p.id()))
            .field("flags", &self.flags)
            .field("logging", &self.logging)
            .finish()
    }
}
