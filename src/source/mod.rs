//! Image sources and fetch backends.
//!
//! An [`ImageSource`] names an image. A [`FetchBackend`] turns it into raw
//! bytes, either as a file on disk or as bytes in memory:
//!
//! ```text
//!   ImageSource::File     ──► FileFetcher    ──► RawHandle::File  (caller's file, kept)
//!   ImageSource::Url      ──► HttpFetcher    ──► RawHandle::File  (temp file, delete after use)
//!   ImageSource::Resource ──► ResourceStore  ──► RawHandle::Bytes
//! ```
//!
//! [`SourceBackends`] routes each source kind to its backend and runs
//! validation before a load is scheduled.

mod descriptor;
mod fetch;
mod file;
mod http;
mod resource;

pub use descriptor::{ImageSource, SourceKind};
pub use fetch::{FetchBackend, Fetched, RawHandle, SourceBackends};
pub use file::FileFetcher;
pub use http::{HttpFetcher, DEFAULT_HTTP_TIMEOUT_SECS};
pub use resource::ResourceStore;
