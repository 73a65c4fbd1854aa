use std::fmt;
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::source::ImageSource;

use super::processor::ImageProcessor;
use super::settings::{CacheFlags, ImageSettings};

/// One immutable load request.
///
/// Two requests are equal when they would do the same work: same cache key
/// (content + variant) and same tier flags.
#[derive(Clone)]
pub struct LoadRequest {
    pub source: ImageSource,
    pub key: CacheKey,
    pub flags: CacheFlags,
    pub processor: Option<Arc<dyn ImageProcessor>>,
    pub logging: bool,
}

impl LoadRequest {
    pub fn new(source: ImageSource, settings: &ImageSettings, default_logging: bool) -> Self {
        let key = CacheKey::new(source.identity(), settings.variant_key());
        Self {
            source,
            key,
            flags: settings.flags,
            processor: settings.processor.clone(),
            logging: settings.logging.unwrap_or(default_logging),
        }
    }
}

impl PartialEq for LoadRequest {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.flags == other.flags
    }
}

impl Eq for LoadRequest {}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("source", &self.source)
            .field("key", &self.key.to_string())
            .field("flags", &self.flags)
            .field("logging", &self.logging)
            .finish()
    }
}
