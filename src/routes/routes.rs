//! Defines routes for the CMS hook surface.
//!
//! ## Structure
//! - **Media hooks**
//!   - `POST /hooks/upload`  : store a new attachment (multipart `file`)
//!   - `POST /hooks/replace` : overwrite an attachment (multipart `record` + `file`)
//!   - `POST /hooks/delete`  : delete an attachment, per the sync switches
//!   - `POST /hooks/resolve` : public URL for an attachment
//!   - `POST /hooks/render`  : re-sign expired asset links in rendered HTML
//!
//! - **Plugin lifecycle and settings**
//!   - `POST /hooks/activate`, `POST /hooks/deactivate`
//!   - `POST /hooks/config/validate` : bucket check that gates a settings save
//!   - `GET|PUT /hooks/config/image-slim`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        hook_handlers::{
            delete_hook, get_image_slim, put_image_slim, render_hook, replace_hook, resolve_hook,
            upload_hook, validate_config_hook,
        },
        lifecycle_handlers::{activate_hook, deactivate_hook},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router for every hook endpoint plus the health probes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // media hooks
        .route("/hooks/upload", post(upload_hook))
        .route("/hooks/replace", post(replace_hook))
        .route("/hooks/delete", post(delete_hook))
        .route("/hooks/resolve", post(resolve_hook))
        .route("/hooks/render", post(render_hook))
        // lifecycle + settings
        .route("/hooks/activate", post(activate_hook))
        .route("/hooks/deactivate", post(deactivate_hook))
        .route("/hooks/config/validate", post(validate_config_hook))
        .route(
            "/hooks/config/image-slim",
            get(get_image_slim).put(put_image_slim),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::StoreConfig, services::memory_store::MemoryStore};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-BOUNDARY";

    fn config() -> StoreConfig {
        StoreConfig::new("AKIDexample", "secret", "ap-beijing", "b-1250000000")
    }

    fn app() -> Router {
        let config = config();
        let store = Arc::new(MemoryStore::new(&config));
        routes().with_state(AppState::new(config, store))
    }

    /// Router plus handles on the store and the spool directory.
    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        spool: TempDir,
    }

    impl Harness {
        fn new(tweak: impl FnOnce(&mut MemoryStore)) -> Self {
            let config = config();
            let mut store = MemoryStore::new(&config);
            tweak(&mut store);
            let store = Arc::new(store);
            let spool = TempDir::new().unwrap();
            let state = AppState::new(config, store.clone()).with_spool_dir(spool.path());
            Self {
                app: routes().with_state(state),
                store,
                spool,
            }
        }

        fn spooled_files(&self) -> usize {
            std::fs::read_dir(self.spool.path()).unwrap().count()
        }
    }

    /// `(field name, file name, content)`; parts without a file name are
    /// plain text fields.
    fn multipart(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::post(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    const RECORD: &str = r#"{"original_name":"a.png","remote_key":"usr/uploads/2024/03/abc.png","size_bytes":1,"extension":"png","mime_type":"image/png"}"#;

    #[tokio::test]
    async fn resolve_returns_signed_url() {
        let (status, body) = post_json(app(), "/hooks/resolve", RECORD).await;
        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap();
        assert!(url.contains("/usr/uploads/2024/03/abc.png?sign="));
    }

    #[tokio::test]
    async fn delete_reports_both_halves() {
        let (status, body) = post_json(app(), "/hooks/delete", RECORD).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["local"]["status"], "skipped");
        assert_eq!(body["remote"]["status"], "deleted");
    }

    #[tokio::test]
    async fn activate_and_deactivate_return_messages() {
        let (status, body) = post_json(app(), "/hooks/activate", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("b-1250000000"));

        let (status, body) = post_json(app(), "/hooks/deactivate", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("local paths"));
    }

    #[tokio::test]
    async fn invalid_image_slim_is_rejected() {
        let request = Request::put("/hooks/config/image-slim")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"auto":true,"api":false,"suffixes":[]}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn health_is_cheap() {
        let request = Request::get("/healthz").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_returns_record_and_clears_spool() {
        let h = Harness::new(|_| {});
        let request = multipart(
            "/hooks/upload",
            &[("file", Some("Cat Photo.PNG"), b"png-bytes".as_slice())],
        );

        let (status, body) = send(h.app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let key = body["remote_key"].as_str().unwrap();
        assert!(key.starts_with("usr/uploads/"));
        assert!(key.ends_with(".png"));
        assert_eq!(body["extension"], "png");
        assert_eq!(body["mime_type"], "image/png");
        assert_eq!(body["size_bytes"], 9);
        assert_eq!(h.store.body(key).unwrap().as_ref(), b"png-bytes");
        assert_eq!(h.spooled_files(), 0);
    }

    #[tokio::test]
    async fn failed_upload_still_clears_spool() {
        let h = Harness::new(|s| s.fail_put = true);
        let request = multipart("/hooks/upload", &[("file", Some("a.png"), b"x".as_slice())]);

        let (status, body) = send(h.app.clone(), request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], 502);
        assert_eq!(h.spooled_files(), 0);
    }

    #[tokio::test]
    async fn upload_without_file_part_is_bad_request() {
        let h = Harness::new(|_| {});
        let request = multipart("/hooks/upload", &[("note", None, b"hello".as_slice())]);

        let (status, body) = send(h.app.clone(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("file"));
        assert!(h.store.calls().is_empty());
    }

    #[tokio::test]
    async fn replace_keeps_key_and_clears_spool() {
        let h = Harness::new(|_| {});
        h.store.insert("usr/uploads/2024/03/abc.png", b"old");
        let request = multipart(
            "/hooks/replace",
            &[
                ("record", None, RECORD.as_bytes()),
                ("file", Some("new.png"), b"newer".as_slice()),
            ],
        );

        let (status, body) = send(h.app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remote_key"], "usr/uploads/2024/03/abc.png");
        assert_eq!(body["original_name"], "a.png");
        assert_eq!(body["size_bytes"], 5);
        assert_eq!(
            h.store.body("usr/uploads/2024/03/abc.png").unwrap().as_ref(),
            b"newer"
        );
        assert_eq!(h.spooled_files(), 0);
    }

    #[tokio::test]
    async fn replace_without_record_is_bad_request() {
        let h = Harness::new(|_| {});
        let request = multipart(
            "/hooks/replace",
            &[("file", Some("new.png"), b"newer".as_slice())],
        );

        let (status, body) = send(h.app.clone(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("record"));
        assert!(h.store.calls().is_empty());
        assert_eq!(h.spooled_files(), 0);
    }

    #[tokio::test]
    async fn replace_outside_upload_prefix_is_refused() {
        let h = Harness::new(|_| {});
        let record = RECORD.replace("usr/uploads/2024/03/abc.png", "usr/uploads/../../etc/x.png");
        let request = multipart(
            "/hooks/replace",
            &[
                ("record", None, record.as_bytes()),
                ("file", Some("x.png"), b"evil".as_slice()),
            ],
        );

        let (status, _) = send(h.app.clone(), request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(h.store.calls().is_empty());
        assert_eq!(h.spooled_files(), 0);
    }

    #[tokio::test]
    async fn delete_outside_upload_prefix_is_refused() {
        let h = Harness::new(|_| {});
        let record = RECORD.replace("usr/uploads/2024/03/abc.png", "/etc/passwd");

        let (status, body) = post_json(h.app.clone(), "/hooks/delete", &record).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("/etc/passwd"));
        assert!(h.store.calls().is_empty());
    }
}
