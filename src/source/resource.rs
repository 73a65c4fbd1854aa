use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{FetchError, SourceError};

use super::descriptor::ImageSource;
use super::fetch::{FetchBackend, Fetched, RawHandle};

/// Named in-memory image assets.
///
/// Resources are served straight from memory and are never written to the
/// original-file tier.
#[derive(Debug, Default)]
pub struct ResourceStore {
    assets: DashMap<String, Bytes>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an asset.
    pub fn insert(&self, name: impl Into<String>, data: Bytes) {
        self.assets.insert(name.into(), data);
    }

    pub fn remove(&self, name: &str) -> Option<Bytes> {
        self.assets.remove(name).map(|(_, data)| data)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[async_trait]
impl FetchBackend for ResourceStore {
    async fn fetch(&self, source: &ImageSource) -> Result<Fetched, FetchError> {
        let ImageSource::Resource(name) = source else {
            return Err(FetchError::Invalid(SourceError::UnsupportedScheme(
                source.kind().as_str().to_string(),
            )));
        };

        let data = self
            .assets
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FetchError::NotFound(name.clone()))?;

        Ok(Fetched {
            handle: RawHandle::Bytes(data),
            delete_after_use: false,
        })
    }

    fn validate(&self, source: &ImageSource) -> Result<(), SourceError> {
        match source {
            ImageSource::Resource(name) if !self.contains(name) => {
                Err(SourceError::UnknownResource(name.clone()))
            }
            _ => Ok(()),
        }
    }
}
