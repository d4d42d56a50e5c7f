//! COS XML API client implementing [`RemoteStore`].
//!
//! Requests go to the configured asset host (custom domain when set, the
//! regional `<bucket>.cos.<region>.myqcloud.com` endpoint otherwise) and are
//! authenticated with a short-lived `Authorization` header.

use super::{
    remote_store::{ByteStream, ObjectMeta, PutOptions, RemoteStore, StoreError, StoreResult},
    signer::{RequestSigner, encode_path},
};
use crate::{
    config::StoreConfig,
    models::image_slim::ImageSlimSettings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Body, Client, Method, RequestBuilder, Response, StatusCode,
    header::{
        AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap, HeaderName,
    },
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("cos-media-offload/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Validity of the `Authorization` header on API calls.
const REQUEST_SIGN_WINDOW: i64 = 15 * 60;
const IMAGE_SLIM_PARAM: &str = "image-slim";
const BUCKET_ARCH_HEADER: &str = "x-cos-bucket-arch";

/// `<Error>` document COS returns with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "Error")]
struct ErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

pub struct CosClient {
    http: Client,
    signer: RequestSigner,
    bucket: String,
    region: String,
    host: String,
    base_url: String,
}

impl CosClient {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            signer: RequestSigner::new(config.secret_id.clone(), config.secret_key.clone()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            host: config.asset_host(),
            base_url: config.asset_base_url(),
        })
    }

    /// Signed request for `path` (leading `/`), optionally with a bare
    /// sub-resource parameter such as `?image-slim`.
    fn request(&self, method: Method, path: &str, sub_resource: Option<&str>) -> RequestBuilder {
        let start = Utc::now().timestamp();
        let params: Vec<(&str, &str)> = sub_resource.map(|p| vec![(p, "")]).unwrap_or_default();
        let auth = self.signer.authorization(
            method.as_str(),
            path,
            &params,
            &[("host", self.host.as_str())],
            start,
            start + REQUEST_SIGN_WINDOW,
        );

        let mut url = format!("{}{}", self.base_url, encode_path(path));
        if let Some(param) = sub_resource {
            url.push('?');
            url.push_str(param);
        }
        self.http.request(method, url).header(AUTHORIZATION, auth)
    }

    fn object_path(key: &str) -> String {
        format!("/{}", key.trim_start_matches('/'))
    }

    /// Map a non-success response onto the store error taxonomy. `key` is
    /// `None` for bucket-level requests.
    async fn error_for(&self, response: Response, key: Option<&str>) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: ErrorBody = quick_xml::de::from_str(&body).unwrap_or_default();
        self.classify(status, parsed, key)
    }

    fn classify(&self, status: StatusCode, body: ErrorBody, key: Option<&str>) -> StoreError {
        let code = if body.code.is_empty() {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        } else {
            body.code
        };

        match (status, code.as_str(), key) {
            (_, "NoSuchBucket", _) | (StatusCode::NOT_FOUND, _, None) => {
                StoreError::BucketNotFound(self.bucket.clone())
            }
            (_, "UpsAppNotExist", _) => StoreError::ImageServiceNotBound(self.bucket.clone()),
            (_, "RegionUnsupport", _) => StoreError::RegionUnsupported(self.region.clone()),
            (StatusCode::NOT_FOUND, _, Some(key)) => StoreError::ObjectNotFound(key.to_string()),
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _, _) => {
                StoreError::AccessDenied(code)
            }
            _ => StoreError::Status {
                status: status.as_u16(),
                code,
                message: body.message,
            },
        }
    }

    async fn head_bucket(&self) -> StoreResult<Response> {
        let response = self.request(Method::HEAD, "/", None).send().await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, None).await);
        }
        Ok(response)
    }
}

fn meta_from_headers(headers: &HeaderMap) -> ObjectMeta {
    let text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ObjectMeta {
        size_bytes: text(CONTENT_LENGTH).and_then(|v| v.parse().ok()),
        etag: text(ETAG).map(|v| v.trim_matches('"').to_string()),
        content_type: text(CONTENT_TYPE),
    }
}

#[async_trait]
impl RemoteStore for CosClient {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let response = self
            .request(Method::HEAD, &Self::object_path(key), None)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.error_for(response, Some(key)).await),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        options: &PutOptions,
    ) -> StoreResult<ObjectMeta> {
        let mut request = self
            .request(Method::PUT, &Self::object_path(key), None)
            .header("x-cos-acl", options.acl.to_string())
            .header(CACHE_CONTROL, options.cache_control.as_str());
        if let Some(content_type) = &options.content_type {
            request = request.header(CONTENT_TYPE, content_type.as_str());
        }
        if let Some(len) = options.content_length {
            request = request.header(CONTENT_LENGTH, len);
        }

        let response = request.body(Body::wrap_stream(body)).send().await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, Some(key)).await);
        }

        // PUT reports the ETag only; its Content-Length is the (empty) response body.
        let mut meta = meta_from_headers(response.headers());
        meta.size_bytes = None;
        debug!(key = %key, etag = ?meta.etag, "COS put object successful");
        Ok(meta)
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectMeta> {
        let response = self
            .request(Method::HEAD, &Self::object_path(key), None)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, Some(key)).await);
        }
        Ok(meta_from_headers(response.headers()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let response = self
            .request(Method::DELETE, &Self::object_path(key), None)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, Some(key)).await);
        }
        debug!(key = %key, "COS delete object successful");
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        self.signer
            .presigned_url(&self.base_url, &self.host, key, ttl, now)
    }

    fn unsigned_url(&self, key: &str) -> String {
        format!("{}{}", self.base_url, encode_path(&Self::object_path(key)))
    }

    async fn bucket_exists(&self) -> StoreResult<bool> {
        match self.head_bucket().await {
            Ok(_) => Ok(true),
            Err(StoreError::BucketNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn bucket_arch(&self) -> StoreResult<Option<String>> {
        let response = self.head_bucket().await?;
        Ok(response
            .headers()
            .get(BUCKET_ARCH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    async fn image_slim(&self) -> StoreResult<ImageSlimSettings> {
        let response = self
            .request(Method::GET, "/", Some(IMAGE_SLIM_PARAM))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, None).await);
        }
        let body = response.text().await?;
        Ok(ImageSlimSettings::from_xml(&body)?)
    }

    async fn set_image_slim(&self, settings: &ImageSlimSettings) -> StoreResult<()> {
        let response = if settings.is_enabled() {
            self.request(Method::PUT, "/", Some(IMAGE_SLIM_PARAM))
                .header(CONTENT_TYPE, "application/xml")
                .body(settings.to_xml())
                .send()
                .await?
        } else {
            self.request(Method::DELETE, "/", Some(IMAGE_SLIM_PARAM))
                .send()
                .await?
        };
        if !response.status().is_success() {
            return Err(self.error_for(response, None).await);
        }
        debug!(mode = %settings.slim_mode(), "COS image slim updated");
        Ok(())
    }
}
