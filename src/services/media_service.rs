//! src/services/media_service.rs
//!
//! MediaService: the create / replace / delete orchestration behind the CMS
//! upload hooks. The bucket is the source of truth; the optional local copy
//! mirrors `<local_root>/<remote_key>` and is best-effort.

use super::{
    name_allocator::{DateBucket, NameAllocator, safe_name},
    remote_store::{PutOptions, RemoteStore, StoreError, file_body},
};
use crate::{
    config::StoreConfig,
    models::{
        asset::{AssetRecord, AssetState, DeleteOutcome, DeleteStep, mime_for_key},
        upload::UploadedFile,
    },
};
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs::{self, DirBuilder};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("no free object key after {attempts} attempts")]
    NameAllocationExhausted { attempts: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Clone)]
pub struct MediaService {
    config: Arc<StoreConfig>,
    store: Arc<dyn RemoteStore>,
    allocator: NameAllocator,
}

impl MediaService {
    pub fn new(config: Arc<StoreConfig>, store: Arc<dyn RemoteStore>) -> Self {
        let allocator = NameAllocator::new(store.clone(), config.base_path());
        Self {
            config,
            store,
            allocator,
        }
    }

    /// Store a new attachment (`absent -> stored`).
    pub async fn upload(&self, file: &UploadedFile) -> MediaResult<AssetRecord> {
        self.upload_at(file, Utc::now()).await
    }

    pub async fn upload_at(
        &self,
        file: &UploadedFile,
        now: DateTime<Utc>,
    ) -> MediaResult<AssetRecord> {
        let (file_name, extension) = self.validate_name(&file.name)?;
        if !self.config.allows_extension(&extension) {
            return Err(MediaError::Validation(format!(
                "file type `{}` is not allowed",
                extension
            )));
        }
        let temp_path = require_payload(file)?;

        let bucket = DateBucket::at(now, self.config.timezone_offset_secs);
        let key = self.allocator.allocate(&file_name, bucket).await?;
        debug!(key = %key, state = %AssetState::Uploading, "uploading attachment");

        let size_bytes = self.push(&key, temp_path, file.size_bytes).await?;
        if self.config.keeps_local_copy() {
            self.mirror_locally(temp_path, &key).await;
        }

        info!(key = %key, size_bytes, state = %AssetState::Stored, "attachment stored");
        Ok(AssetRecord {
            original_name: file_name,
            mime_type: mime_for_key(&key),
            remote_key: key,
            size_bytes,
            extension,
        })
    }

    /// Overwrite an existing attachment in place (`stored -> stored`).
    ///
    /// The new file must carry the same extension as the record; the key,
    /// name and type are kept and only the size is refreshed.
    pub async fn replace(
        &self,
        existing: &AssetRecord,
        file: &UploadedFile,
    ) -> MediaResult<AssetRecord> {
        self.validate_key(&existing.remote_key)?;
        let (_, extension) = self.validate_name(&file.name)?;
        if !extension.eq_ignore_ascii_case(&existing.extension) {
            return Err(MediaError::Validation(format!(
                "replacement type `{}` does not match `{}`",
                extension, existing.extension
            )));
        }
        let temp_path = require_payload(file)?;

        let key = &existing.remote_key;
        debug!(key = %key, state = %AssetState::Uploading, "replacing attachment");
        let size_bytes = self.push(key, temp_path, file.size_bytes).await?;
        if self.config.keeps_local_copy() {
            self.mirror_locally(temp_path, key).await;
        }

        info!(key = %key, size_bytes, state = %AssetState::Stored, "attachment replaced");
        Ok(AssetRecord {
            size_bytes,
            ..existing.clone()
        })
    }

    /// Remove an attachment (`stored -> deleted`).
    ///
    /// Local and remote deletions are independent; the outcome says which
    /// one failed so only that half needs a retry. A key outside the upload
    /// prefix is rejected before anything is touched.
    pub async fn delete(&self, existing: &AssetRecord) -> MediaResult<DeleteOutcome> {
        let key = &existing.remote_key;
        self.validate_key(key)?;
        debug!(key = %key, state = %AssetState::Deleting, "deleting attachment");

        let local = if self.config.deletes_local_copy() {
            let path = self.local_path(key);
            match fs::remove_file(&path).await {
                Ok(()) => DeleteStep::Deleted,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("local copy {} already missing", path.display());
                    DeleteStep::Deleted
                }
                Err(err) => {
                    warn!("failed to remove local copy {}: {}", path.display(), err);
                    DeleteStep::Failed(err.to_string())
                }
            }
        } else {
            DeleteStep::Skipped
        };

        let remote = if self.config.deletes_remote_object() {
            match self.store.delete(key).await {
                Ok(()) => DeleteStep::Deleted,
                Err(err) => {
                    warn!(key = %key, error = %err, "remote delete failed");
                    DeleteStep::Failed(err.to_string())
                }
            }
        } else {
            DeleteStep::Skipped
        };

        let outcome = DeleteOutcome { local, remote };
        info!(key = %key, state = %outcome.state(), "attachment delete finished");
        Ok(outcome)
    }

    /// Keys arriving from the CMS must be relative, `/`-separated and live
    /// under the upload prefix; they are joined onto `local_root`.
    fn validate_key(&self, key: &str) -> MediaResult<()> {
        let invalid = |reason: &str| {
            Err(MediaError::Validation(format!(
                "object key `{}` {}",
                key, reason
            )))
        };
        if key.contains('\\') || key.contains('\0') {
            return invalid("contains forbidden characters");
        }
        if key.starts_with('/') || Path::new(key).is_absolute() {
            return invalid("must be relative");
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return invalid("has empty or dot segments");
        }
        let prefix = format!("{}/", self.config.base_path());
        if !key.starts_with(&prefix) {
            return invalid(&format!("is outside `{}`", self.config.base_path()));
        }
        Ok(())
    }

    fn validate_name(&self, raw: &str) -> MediaResult<(String, String)> {
        if raw.trim().is_empty() {
            return Err(MediaError::Validation("missing file name".into()));
        }
        let name = safe_name(raw);
        let extension = name
            .extension
            .ok_or_else(|| MediaError::Validation(format!("`{}` has no file extension", raw)))?;
        Ok((name.file_name, extension))
    }

    /// Stream `temp_path` to `key`; returns the stored size.
    async fn push(&self, key: &str, temp_path: &Path, declared: Option<u64>) -> MediaResult<u64> {
        let (body, len) = file_body(temp_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MediaError::Validation("temporary upload payload is missing".into())
            } else {
                MediaError::Io(err)
            }
        })?;

        let options = PutOptions::attachment(&mime_for_key(key), Some(len));
        let meta = self.store.put(key, body, &options).await?;

        match meta.size_bytes.or(declared) {
            Some(size) => Ok(size),
            None => match self.store.head(key).await {
                Ok(head) => Ok(head.size_bytes.unwrap_or(len)),
                Err(err) => {
                    warn!(key = %key, error = %err, "size lookup failed, using spooled length");
                    Ok(len)
                }
            },
        }
    }

    fn local_path(&self, key: &str) -> PathBuf {
        self.config.local_root.join(key)
    }

    /// Move the spooled upload under the local mirror. Failures are logged;
    /// the remote write already succeeded.
    async fn mirror_locally(&self, temp_path: &Path, key: &str) {
        let target = self.local_path(key);
        if let Err(err) = move_into(temp_path, &target).await {
            warn!(
                "failed to keep local copy {} of {}: {}",
                target.display(),
                key,
                err
            );
        }
    }
}

fn require_payload(file: &UploadedFile) -> MediaResult<&Path> {
    file.temp_path
        .as_deref()
        .ok_or_else(|| MediaError::Validation("no temporary upload payload".into()))
}

/// Rename `from` to `to`, creating parent directories (0755) first and
/// falling back to copy + remove across filesystems.
async fn move_into(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(parent).await?;
    }

    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(err),
        Err(_) => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await
        }
    }
}
