use thiserror::Error;

/// Problems with an image descriptor, detected before any work is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Path, URL or resource name is empty
    #[error("Empty image source")]
    Empty,

    /// URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// URL parsed but uses a scheme no backend can fetch
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Resource name is not registered in the resource store
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

/// Errors raised by fetch backends while obtaining raw image bytes.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The source does not exist (missing file, HTTP 404, unregistered resource)
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Local I/O failure while reading or staging the source
    #[error("I/O error: {0}")]
    Io(String),

    /// Network or protocol failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The backend was handed a source it cannot handle
    #[error("Invalid source: {0}")]
    Invalid(#[from] SourceError),
}

/// Errors raised while turning raw bytes into pixels.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Bytes are not in a recognised image format
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Bytes look like an image but could not be decoded
    #[error("Corrupt image data: {0}")]
    Corrupt(String),

    /// Decoded image has zero width or height
    #[error("Decoded image is empty")]
    EmptyImage,
}

/// Errors raised by the durable cache tiers.
///
/// These never reach a caller of the cache: puts turn them into `false`
/// and gets into a miss, after logging.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// Bitmap could not be encoded for storage
    #[error("Encode error: {0}")]
    Encode(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Terminal result of a load that produced no bitmap.
///
/// This is the completion value of a task. It is reported to the slot as an
/// error placeholder and to the caller through the task handle.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Raw bytes could not be obtained
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Raw bytes could not be decoded
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Descriptor failed validation
    #[error("Invalid source: {0}")]
    Invalid(#[from] SourceError),

    /// The worker pool refused the work
    #[error("Load rejected by the worker pool")]
    Rejected,

    /// The task was cancelled before it produced a bitmap
    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Whether this error means the load was abandoned rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}

/// Errors raised while assembling a loader from configuration.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    /// Cache directories could not be prepared
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Configuration failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}
