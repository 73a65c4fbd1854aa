//! Cache identities.
//!
//! A [`CacheKey`] is the pair of a [`ContentIdentity`] (which image) and a
//! [`VariantKey`] (which rendering of it). Both halves compare and hash
//! field by field, so two independently built requests for the same
//! rendering always produce equal keys.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::decode::SizeMode;

/// Separator between the content identity and the variant signature.
///
/// Content identities are lowercase hex, so the separator can never occur
/// inside the first half of a key string.
pub const KEY_SEPARATOR: char = '#';

// =============================================================================
// Content Identity
// =============================================================================

/// Identity of a source image, independent of size or processing.
///
/// Always a SHA-256 hex digest of the source kind and locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentIdentity(Arc<str>);

impl ContentIdentity {
    /// Derive the identity of a source from its kind tag and locator.
    ///
    /// The kind tag keeps `file:/a` and `url:/a` apart.
    pub fn from_locator(kind: &str, locator: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(b"\0");
        hasher.update(locator.as_bytes());
        Self(Arc::from(hex::encode(hasher.finalize())))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Variant Key
// =============================================================================

/// Everything that affects the decoded pixels of a content identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    /// Requested width in pixels (0 = unconstrained)
    pub width: u32,

    /// Requested height in pixels (0 = unconstrained)
    pub height: u32,

    /// Extra subsampling added on top of the computed factor
    pub downsample: u32,

    /// How the decoded image is fitted to the requested box
    pub size_mode: SizeMode,

    /// Whether the image may be enlarged to reach the requested box
    pub scale_up: bool,

    /// Identity of the post-processor, if any
    pub processor: Option<Arc<str>>,
}

impl VariantKey {
    /// Stable string encoding of every field.
    ///
    /// The processor id is length-prefixed so that arbitrary processor ids
    /// cannot forge another variant's signature.
    pub fn signature(&self) -> String {
        let processor = match &self.processor {
            Some(id) => format!("p{}:{}", id.len(), id),
            None => "p-".to_string(),
        };
        format!(
            "{}x{};d{};{};u{};{}",
            self.width,
            self.height,
            self.downsample,
            self.size_mode.as_str(),
            u8::from(self.scale_up),
            processor
        )
    }
}

impl Default for VariantKey {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            downsample: 0,
            size_mode: SizeMode::default(),
            scale_up: false,
            processor: None,
        }
    }
}

// =============================================================================
// Cache Key
// =============================================================================

/// Full identity of a cached rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    content: ContentIdentity,
    variant: VariantKey,
}

impl CacheKey {
    /// Combine a content identity with a variant.
    pub fn new(content: ContentIdentity, variant: VariantKey) -> Self {
        Self { content, variant }
    }

    pub fn content(&self) -> &ContentIdentity {
        &self.content
    }

    pub fn variant(&self) -> &VariantKey {
        &self.variant
    }

    /// SHA-256 hex digest of the key string, used as a file name.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.to_string().as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.content,
            KEY_SEPARATOR,
            self.variant.signature()
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
