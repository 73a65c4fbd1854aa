use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{FetchError, InitError, SourceError};

use super::descriptor::ImageSource;
use super::fetch::{FetchBackend, Fetched, RawHandle};

/// Default request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("image-loader/", env!("CARGO_PKG_VERSION"));

/// Downloads `http`/`https` sources into temporary files.
///
/// Each download lands in its own file under the staging directory and is
/// returned with `delete_after_use = true`, so the original-file tier can
/// move it into place instead of copying.
pub struct HttpFetcher {
    client: reqwest::Client,
    staging_dir: PathBuf,
    counter: AtomicU64,
}

impl HttpFetcher {
    /// Build a fetcher staging downloads under `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>, timeout_secs: u64) -> Result<Self, InitError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| InitError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            staging_dir: staging_dir.into(),
            counter: AtomicU64::new(0),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn next_staging_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.staging_dir
            .join(format!("download-{}-{}.part", std::process::id(), n))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {} from {}", status, url)));
        }

        let io_err = |e: std::io::Error| FetchError::Io(format!("{}: {}", dest.display(), e));

        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Http(format!("Failed to read response: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        Ok(written)
    }
}

#[async_trait]
impl FetchBackend for HttpFetcher {
    async fn fetch(&self, source: &ImageSource) -> Result<Fetched, FetchError> {
        let ImageSource::Url(raw) = source else {
            return Err(FetchError::Invalid(SourceError::UnsupportedScheme(
                source.kind().as_str().to_string(),
            )));
        };
        let url = source.parse_url(raw)?;

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {}", self.staging_dir.display(), e)))?;

        let dest = self.next_staging_path();
        match self.download(url.as_str(), &dest).await {
            Ok(bytes) => {
                debug!(url = %url, bytes, path = %dest.display(), "Downloaded source");
                Ok(Fetched {
                    handle: RawHandle::File(dest),
                    delete_after_use: true,
                })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                Err(e)
            }
        }
    }
}
