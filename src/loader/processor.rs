use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

/// Bitmap-to-bitmap post-processing step.
///
/// One instance is shared by every request that names it, possibly from
/// several workers at once, so `process` must not depend on mutable state.
/// `id` participates in the cache key: two processors with different
/// output must never share an id.
pub trait ImageProcessor: Send + Sync {
    fn id(&self) -> &str;

    fn process(&self, image: RgbaImage) -> RgbaImage;
}

/// Processor backed by a closure.
pub struct FnProcessor<F> {
    id: Arc<str>,
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(RgbaImage) -> RgbaImage + Send + Sync,
{
    pub fn new(id: impl Into<Arc<str>>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

impl<F> ImageProcessor for FnProcessor<F>
where
    F: Fn(RgbaImage) -> RgbaImage + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, image: RgbaImage) -> RgbaImage {
        (self.f)(image)
    }
}

impl<F> fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor").field("id", &self.id).finish()
    }
}
