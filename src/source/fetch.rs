use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{FetchError, SourceError};

use super::descriptor::{ImageSource, SourceKind};
use super::resource::ResourceStore;

// =============================================================================
// Raw Handles
// =============================================================================

/// Where fetched raw bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawHandle {
    /// Bytes in a file on disk
    File(PathBuf),
    /// Bytes already in memory
    Bytes(Bytes),
}

impl RawHandle {
    /// Load the raw bytes.
    pub async fn read(&self) -> Result<Bytes, FetchError> {
        match self {
            RawHandle::File(path) => match tokio::fs::read(path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(FetchError::NotFound(path.display().to_string()))
                }
                Err(e) => Err(FetchError::Io(format!("{}: {}", path.display(), e))),
            },
            RawHandle::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RawHandle::File(path) => Some(path),
            RawHandle::Bytes(_) => None,
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub handle: RawHandle,

    /// The handle is a temporary file owned by the loader: it may be moved
    /// into the original-file tier and must be deleted once used.
    pub delete_after_use: bool,
}

// =============================================================================
// Fetch Backend
// =============================================================================

/// Obtains raw bytes for a source.
///
/// Implementations must be safe to call concurrently for different sources.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, source: &ImageSource) -> Result<Fetched, FetchError>;

    /// Backend-specific checks run before a load is scheduled.
    fn validate(&self, _source: &ImageSource) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Dispatch table from source kind to backend.
#[derive(Clone)]
pub struct SourceBackends {
    file: Arc<dyn FetchBackend>,
    url: Arc<dyn FetchBackend>,
    resource: Arc<dyn FetchBackend>,
}

impl SourceBackends {
    pub fn new(
        file: Arc<dyn FetchBackend>,
        url: Arc<dyn FetchBackend>,
        resource: Arc<dyn FetchBackend>,
    ) -> Self {
        Self {
            file,
            url,
            resource,
        }
    }

    /// Route every source kind to the same backend.
    pub fn uniform(backend: Arc<dyn FetchBackend>) -> Self {
        Self {
            file: Arc::clone(&backend),
            url: Arc::clone(&backend),
            resource: backend,
        }
    }

    /// Replace the resource backend with a store.
    pub fn with_resources(mut self, store: Arc<ResourceStore>) -> Self {
        self.resource = store;
        self
    }

    pub fn backend_for(&self, source: &ImageSource) -> &Arc<dyn FetchBackend> {
        match source.kind() {
            SourceKind::File => &self.file,
            SourceKind::Url => &self.url,
            SourceKind::Resource => &self.resource,
        }
    }

    /// Structural validation followed by the backend's own checks.
    pub fn validate(&self, source: &ImageSource) -> Result<(), SourceError> {
        source.validate()?;
        self.backend_for(source).validate(source)
    }

    pub async fn fetch(&self, source: &ImageSource) -> Result<Fetched, FetchError> {
        self.backend_for(source).fetch(source).await
    }
}
