//! Collision-free object keys for new uploads.
//!
//! Keys look like `<base_path>/<YYYY>/<MM>/<md5(uuid v4)>.<ext>`: nothing of
//! the original filename survives except its (sanitized, lowercased)
//! extension. Uniqueness is checked against the bucket, not reserved, so two
//! concurrent uploads can still race between the check and the write.

use super::{
    media_service::{MediaError, MediaResult},
    remote_store::RemoteStore,
};
use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_NAME_ATTEMPTS: usize = 10;

/// Year/month directory new uploads land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBucket {
    pub year: i32,
    pub month: u32,
}

impl DateBucket {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Bucket for `now` shifted into the site's timezone.
    pub fn at(now: DateTime<Utc>, offset_secs: i32) -> Self {
        let offset = FixedOffset::east_opt(offset_secs).unwrap_or_else(|| Utc.fix());
        let local = now.with_timezone(&offset);
        Self::new(local.year(), local.month())
    }

    pub fn directory(&self, base_path: &str) -> String {
        format!("{}/{:04}/{:02}", base_path, self.year, self.month)
    }
}

/// Filename after stripping traversal characters, plus its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeName {
    pub file_name: String,
    pub extension: Option<String>,
}

/// Sanitize an untrusted filename.
///
/// Drops `"`, `<` and `>`, turns `\` into `/`, keeps only the last path
/// segment and lowercases whatever follows its final dot.
pub fn safe_name(raw: &str) -> SafeName {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '<' | '>'))
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();
    let file_name = cleaned.rsplit('/').next().unwrap_or_default().to_string();

    // A leading dot alone (".htaccess") still counts as an extension separator.
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty());

    SafeName {
        file_name,
        extension,
    }
}

/// Fresh opaque filename stem: md5 of a v4 UUID, hex encoded.
fn opaque_token() -> String {
    format!("{:x}", md5::compute(Uuid::new_v4().as_bytes()))
}

#[derive(Clone)]
pub struct NameAllocator {
    store: Arc<dyn RemoteStore>,
    base_path: String,
    max_attempts: usize,
}

impl NameAllocator {
    pub fn new(store: Arc<dyn RemoteStore>, base_path: impl Into<String>) -> Self {
        Self {
            store,
            base_path: base_path.into(),
            max_attempts: MAX_NAME_ATTEMPTS,
        }
    }

    /// Pick a key for `original_name` that does not exist in the bucket yet.
    ///
    /// Fails with `NameAllocationExhausted` when every attempt collides; a
    /// failing existence check aborts immediately.
    pub async fn allocate(&self, original_name: &str, bucket: DateBucket) -> MediaResult<String> {
        let extension = safe_name(original_name).extension.ok_or_else(|| {
            MediaError::Validation(format!("`{}` has no file extension", original_name))
        })?;
        let directory = bucket.directory(&self.base_path);

        for attempt in 1..=self.max_attempts {
            let candidate = format!("{}/{}.{}", directory, opaque_token(), extension);
            if !self.store.exists(&candidate).await? {
                debug!(key = %candidate, attempt, "allocated object key");
                return Ok(candidate);
            }
            warn!(key = %candidate, attempt, "object key already taken, retrying");
        }

        Err(MediaError::NameAllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}
