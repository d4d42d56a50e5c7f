//! Capability interface over the object-storage service.
//!
//! Everything above this layer talks to the bucket through [`RemoteStore`],
//! which keeps the orchestration logic testable against an in-memory double.

use crate::models::image_slim::ImageSlimSettings;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::{fmt, io, path::Path, pin::Pin, time::Duration};
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Streaming request body.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Access control applied when an object is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Private,
    PublicRead,
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        })
    }
}

#[derive(Debug, Clone)]
pub struct PutOptions {
    pub acl: Acl,
    pub cache_control: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl PutOptions {
    /// Options every attachment upload uses.
    pub fn attachment(content_type: &str, content_length: Option<u64>) -> Self {
        Self {
            acl: Acl::PublicRead,
            cache_control: "private".into(),
            content_type: Some(content_type.to_string()),
            content_length,
        }
    }
}

/// Metadata the store reports for an object. Fields are optional because
/// not every call returns all of them (a PUT carries no length, for one).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size_bytes: Option<u64>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("bucket `{0}` is an OFS bucket, image slim is not supported")]
    OfsBucket(String),
    #[error("bucket `{0}` is not bound to Cloud Infinite, bind it before enabling image slim")]
    ImageServiceNotBound(String),
    #[error("region `{0}` does not support image slim")]
    RegionUnsupported(String),
    #[error("store returned {status} {code}: {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
    #[error("malformed XML from store: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("not supported by this store: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Object-storage operations consumed by the media services.
///
/// URL generation is local (signing needs no round trip), so those two
/// methods are synchronous.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn put(&self, key: &str, body: ByteStream, options: &PutOptions)
    -> StoreResult<ObjectMeta>;

    async fn head(&self, key: &str) -> StoreResult<ObjectMeta>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Link valid for `ttl` starting at `now`.
    fn signed_url(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> String;

    fn unsigned_url(&self, key: &str) -> String;

    /// Whether the configured bucket is reachable with the configured credentials.
    async fn bucket_exists(&self) -> StoreResult<bool>;

    /// Bucket architecture reported by HEAD bucket; `None` for a plain
    /// object bucket, `Some("OFS")` for a metadata-accelerated one.
    async fn bucket_arch(&self) -> StoreResult<Option<String>>;

    async fn image_slim(&self) -> StoreResult<ImageSlimSettings> {
        Err(StoreError::Unsupported("image slim"))
    }

    async fn set_image_slim(&self, settings: &ImageSlimSettings) -> StoreResult<()> {
        let _ = settings;
        Err(StoreError::Unsupported("image slim"))
    }
}

/// Open `path` as a streaming body; returns the stream and the file length.
pub async fn file_body(path: &Path) -> io::Result<(ByteStream, u64)> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let stream: ByteStream = Box::pin(ReaderStream::new(file));
    Ok((stream, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn file_body_streams_whole_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello object store").unwrap();

        let (mut stream, len) = file_body(tmp.path()).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(len, 18);
        assert_eq!(collected, b"hello object store");
    }

    #[test]
    fn attachment_options_are_public_read_private_cache() {
        let options = PutOptions::attachment("image/png", Some(3));
        assert_eq!(options.acl.to_string(), "public-read");
        assert_eq!(options.cache_control, "private");
    }
}
