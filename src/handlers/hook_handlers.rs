//! HTTP handlers for the CMS media hooks.
//! Uploads arrive as multipart and are spooled to a temp file, then handed
//! to `MediaService`, which streams them to the bucket.

use crate::{
    config::StoreConfig,
    errors::AppError,
    models::{
        asset::{AssetRecord, DeleteOutcome},
        image_slim::ImageSlimSettings,
        upload::UploadedFile,
    },
    services::{cos_client::CosClient, settings},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::{io::ErrorKind, path::Path};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Serialize)]
pub struct ResolveResponse {
    pub url: String,
}

/// Candidate settings from the CMS form. Image slim switches are optional
/// and only applied once the bucket check passes.
#[derive(Deserialize)]
pub struct ValidateRequest {
    #[serde(flatten)]
    pub config: StoreConfig,
    #[serde(default)]
    pub image_slim: Option<ImageSlimSettings>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub status: &'static str,
    pub bucket: String,
    pub host: String,
}

/// `POST /hooks/upload` (multipart `file`)
pub async fn upload_hook(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AssetRecord>, AppError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            file = Some(spool(&state.spool_dir, field).await?);
        }
    }
    let file = file.ok_or_else(|| AppError::bad_request("missing `file` part"))?;

    let result = state.media.upload(&file).await;
    discard(&file).await;
    Ok(Json(result?))
}

/// `POST /hooks/replace` (multipart `record` JSON + `file`)
pub async fn replace_hook(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AssetRecord>, AppError> {
    let mut record_json = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some("record") => record_json = Some(field.text().await?),
            Some("file") => file = Some(spool(&state.spool_dir, field).await?),
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::bad_request("missing `file` part"))?;
    let record = match record_json.as_deref().map(serde_json::from_str::<AssetRecord>) {
        Some(Ok(record)) => record,
        Some(Err(err)) => {
            discard(&file).await;
            return Err(AppError::bad_request(format!("invalid `record`: {}", err)));
        }
        None => {
            discard(&file).await;
            return Err(AppError::bad_request("missing `record` part"));
        }
    };

    let result = state.media.replace(&record, &file).await;
    discard(&file).await;
    Ok(Json(result?))
}

/// `POST /hooks/delete`: 200 when every enabled half succeeded, 502 with the
/// outcome otherwise so the caller knows which half to retry. Keys outside
/// the upload prefix are refused with 422.
pub async fn delete_hook(
    State(state): State<AppState>,
    Json(record): Json<AssetRecord>,
) -> Result<(StatusCode, Json<DeleteOutcome>), AppError> {
    let outcome = state.media.delete(&record).await?;
    let status = if outcome.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(outcome)))
}

/// `POST /hooks/resolve`
pub async fn resolve_hook(
    State(state): State<AppState>,
    Json(record): Json<AssetRecord>,
) -> Json<ResolveResponse> {
    Json(ResolveResponse {
        url: state.resolver.resolve(&record.remote_key),
    })
}

/// `POST /hooks/render`: rendered post HTML in, same HTML with expired asset
/// links re-signed out.
pub async fn render_hook(State(state): State<AppState>, body: String) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        state.rewriter.rewrite(&body),
    )
}

/// `POST /hooks/config/validate`: checks candidate settings before the CMS
/// saves them, then applies the image slim switches if the form sent any.
pub async fn validate_config_hook(
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    let candidate = request.config;
    let client = CosClient::new(&candidate)?;
    settings::save_settings(&client, &candidate, request.image_slim.as_ref()).await?;
    Ok(Json(ValidateResponse {
        status: "ok",
        bucket: candidate.bucket.clone(),
        host: candidate.asset_host(),
    }))
}

/// `GET /hooks/config/image-slim`
pub async fn get_image_slim(
    State(state): State<AppState>,
) -> Result<Json<ImageSlimSettings>, AppError> {
    let current = settings::current_image_slim(state.store.as_ref(), &state.config).await?;
    Ok(Json(current))
}

/// `PUT /hooks/config/image-slim`
pub async fn put_image_slim(
    State(state): State<AppState>,
    Json(wanted): Json<ImageSlimSettings>,
) -> Result<Json<ImageSlimSettings>, AppError> {
    settings::apply_image_slim(state.store.as_ref(), &state.config, &wanted).await?;
    Ok(Json(wanted))
}

/// Write a multipart file part to a fresh file under `dir`, counting its size.
async fn spool(dir: &Path, mut field: Field<'_>) -> Result<UploadedFile, AppError> {
    let name = field.file_name().unwrap_or_default().to_string();
    let path = dir.join(format!(".upload-{}", Uuid::new_v4()));

    let mut out = fs::File::create(&path).await?;
    let mut size = 0u64;
    let copied: Result<(), AppError> = async {
        while let Some(chunk) = field.chunk().await? {
            out.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(())
    }
    .await;

    if let Err(err) = copied {
        remove_spooled(&path).await;
        return Err(err);
    }
    tracing::debug!(name = %name, size_bytes = size, "spooled upload to {}", path.display());
    Ok(UploadedFile::new(name, path).with_size(size))
}

async fn discard(file: &UploadedFile) {
    if let Some(path) = file.temp_path.as_deref() {
        remove_spooled(path).await;
    }
}

/// The local mirror may already have moved the file away.
async fn remove_spooled(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("could not remove spooled upload {}: {}", path.display(), err),
    }
}
