//! In-memory `RemoteStore` used by the service tests.
//!
//! Records every call so tests can assert on which operations ran, and can
//! be told to report collisions or fail specific operations.

use super::{
    remote_store::{ByteStream, ObjectMeta, PutOptions, RemoteStore, StoreError, StoreResult},
    signer::RequestSigner,
};
use crate::{config::StoreConfig, models::image_slim::ImageSlimSettings};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    Put(String),
    Head(String),
    Delete(String),
    SetImageSlim,
}

pub struct MemoryStore {
    signer: RequestSigner,
    base_url: String,
    host: String,
    objects: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<Call>>,
    slim: Mutex<ImageSlimSettings>,
    /// The first N existence checks report a collision.
    collisions: AtomicUsize,
    pub bucket_present: bool,
    pub bucket_arch: Option<String>,
    /// Returned (once) by the next image slim call instead of succeeding.
    pub slim_error: Mutex<Option<StoreError>>,
    pub fail_put: bool,
    pub fail_head: bool,
    pub fail_delete: bool,
}

impl MemoryStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            signer: RequestSigner::new(config.secret_id.clone(), config.secret_key.clone()),
            base_url: config.asset_base_url(),
            host: config.asset_host(),
            objects: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            slim: Mutex::new(ImageSlimSettings::default()),
            collisions: AtomicUsize::new(0),
            bucket_present: true,
            bucket_arch: None,
            slim_error: Mutex::new(None),
            fail_put: false,
            fail_head: false,
            fail_delete: false,
        }
    }

    pub fn with_collisions(self, n: usize) -> Self {
        self.collisions.store(n, Ordering::SeqCst);
        self
    }

    pub fn insert(&self, key: &str, body: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(body));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn body(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.record(Call::Exists(key.to_string()));
        let forced = self
            .collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(forced || self.contains(key))
    }

    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        _options: &PutOptions,
    ) -> StoreResult<ObjectMeta> {
        self.record(Call::Put(key.to_string()));
        if self.fail_put {
            return Err(StoreError::Status {
                status: 503,
                code: "ServiceUnavailable".into(),
                message: "try again later".into(),
            });
        }
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk?);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from(collected));
        Ok(ObjectMeta::default())
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectMeta> {
        self.record(Call::Head(key.to_string()));
        if self.fail_head {
            return Err(StoreError::AccessDenied("head not allowed".into()));
        }
        let body = self
            .body(key)
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
        Ok(ObjectMeta {
            size_bytes: Some(body.len() as u64),
            ..ObjectMeta::default()
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.record(Call::Delete(key.to_string()));
        if self.fail_delete {
            return Err(StoreError::AccessDenied("delete not allowed".into()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        self.signer
            .presigned_url(&self.base_url, &self.host, key, ttl, now)
    }

    fn unsigned_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn bucket_exists(&self) -> StoreResult<bool> {
        Ok(self.bucket_present)
    }

    async fn bucket_arch(&self) -> StoreResult<Option<String>> {
        Ok(self.bucket_arch.clone())
    }

    async fn image_slim(&self) -> StoreResult<ImageSlimSettings> {
        if let Some(err) = self.slim_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.slim.lock().unwrap().clone())
    }

    async fn set_image_slim(&self, settings: &ImageSlimSettings) -> StoreResult<()> {
        self.record(Call::SetImageSlim);
        if let Some(err) = self.slim_error.lock().unwrap().take() {
            return Err(err);
        }
        *self.slim.lock().unwrap() = settings.clone();
        Ok(())
    }
}
