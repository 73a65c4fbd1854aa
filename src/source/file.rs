use async_trait::async_trait;

use crate::error::{FetchError, SourceError};

use super::descriptor::ImageSource;
use super::fetch::{FetchBackend, Fetched, RawHandle};

/// Serves local files in place.
///
/// The returned handle points at the caller's file, so it is never deleted
/// or moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FetchBackend for FileFetcher {
    async fn fetch(&self, source: &ImageSource) -> Result<Fetched, FetchError> {
        let ImageSource::File(path) = source else {
            return Err(FetchError::Invalid(SourceError::UnsupportedScheme(
                source.kind().as_str().to_string(),
            )));
        };

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(FetchError::Io(format!("{}: {}", path.display(), e))),
        };

        if !metadata.is_file() {
            return Err(FetchError::NotFound(path.display().to_string()));
        }

        Ok(Fetched {
            handle: RawHandle::File(path.clone()),
            delete_after_use: false,
        })
    }
}
