//! Image descriptors.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::cache::ContentIdentity;
use crate::error::SourceError;

/// Which backend family a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    File,
    Url,
    Resource,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Url => "url",
            SourceKind::Resource => "resource",
        }
    }
}

/// Where an image comes from.
///
/// `File` and `Url` are fetchable: their raw bytes can be staged on disk
/// and kept in the original-file tier. `Resource` names an in-memory asset
/// that is always available and never copied to disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// A local file path
    File(PathBuf),
    /// An `http`/`https` URL (validated lazily)
    Url(String),
    /// A named asset registered in a resource store
    Resource(String),
}

impl ImageSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageSource::File(path.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        ImageSource::Url(url.into())
    }

    pub fn resource(name: impl Into<String>) -> Self {
        ImageSource::Resource(name.into())
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            ImageSource::File(_) => SourceKind::File,
            ImageSource::Url(_) => SourceKind::Url,
            ImageSource::Resource(_) => SourceKind::Resource,
        }
    }

    /// The path, URL or resource name as text.
    pub fn locator(&self) -> Cow<'_, str> {
        match self {
            ImageSource::File(path) => path.to_string_lossy(),
            ImageSource::Url(url) => Cow::Borrowed(url.as_str()),
            ImageSource::Resource(name) => Cow::Borrowed(name.as_str()),
        }
    }

    /// Content identity: the same for every variant of this source.
    pub fn identity(&self) -> ContentIdentity {
        ContentIdentity::from_locator(self.kind().as_str(), &self.locator())
    }

    /// Whether raw bytes for this source belong in the original-file tier.
    pub fn caches_original(&self) -> bool {
        !matches!(self, ImageSource::Resource(_))
    }

    /// Structural checks that need no backend.
    ///
    /// Whether a resource name is actually registered is checked by the
    /// resource backend.
    pub fn validate(&self) -> Result<(), SourceError> {
        match self {
            ImageSource::File(path) => {
                if path.as_os_str().is_empty() {
                    return Err(SourceError::Empty);
                }
            }
            ImageSource::Url(raw) => {
                self.parse_url(raw)?;
            }
            ImageSource::Resource(name) => {
                if name.trim().is_empty() {
                    return Err(SourceError::Empty);
                }
            }
        }
        Ok(())
    }

    /// Parse a URL source, accepting only `http` and `https`.
    pub(crate) fn parse_url(&self, raw: &str) -> Result<Url, SourceError> {
        if raw.trim().is_empty() {
            return Err(SourceError::Empty);
        }
        let url = Url::parse(raw).map_err(|e| SourceError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SourceError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.locator())
    }
}
