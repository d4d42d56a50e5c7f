//! Checks run before the CMS saves plugin settings, and the bucket-level
//! image slim switches.

use super::{
    media_service::{MediaError, MediaResult},
    remote_store::{RemoteStore, StoreError},
};
use crate::{config::StoreConfig, models::image_slim::ImageSlimSettings};
use tracing::{info, warn};

/// Confirm the configured bucket exists and is reachable with the
/// configured credentials. A failure here blocks the save.
pub async fn validate_bucket(store: &dyn RemoteStore, config: &StoreConfig) -> MediaResult<()> {
    let missing = config.missing_fields();
    if !missing.is_empty() {
        return Err(MediaError::Validation(format!(
            "missing required settings: {}",
            missing.join(", ")
        )));
    }

    match store.bucket_exists().await {
        Ok(true) => {
            info!(bucket = %config.bucket, host = %config.asset_host(), "bucket validated");
            Ok(())
        }
        Ok(false) => {
            warn!(bucket = %config.bucket, "bucket does not exist");
            Err(StoreError::BucketNotFound(config.bucket.clone()).into())
        }
        Err(err) => {
            warn!(bucket = %config.bucket, error = %err, "bucket check failed");
            Err(err.into())
        }
    }
}

/// Full settings save: bucket check first, then the image slim switches
/// when the form carries them. Nothing is applied if the bucket check fails.
pub async fn save_settings(
    store: &dyn RemoteStore,
    config: &StoreConfig,
    image_slim: Option<&ImageSlimSettings>,
) -> MediaResult<()> {
    validate_bucket(store, config).await?;
    if let Some(settings) = image_slim {
        apply_image_slim(store, config, settings).await?;
    }
    Ok(())
}

/// OFS buckets have no image slim support.
async fn ensure_slim_capable(store: &dyn RemoteStore, config: &StoreConfig) -> MediaResult<()> {
    if let Some(arch) = store.bucket_arch().await? {
        warn!(bucket = %config.bucket, arch = %arch, "image slim refused for bucket architecture");
        return Err(StoreError::OfsBucket(config.bucket.clone()).into());
    }
    Ok(())
}

pub async fn current_image_slim(
    store: &dyn RemoteStore,
    config: &StoreConfig,
) -> MediaResult<ImageSlimSettings> {
    ensure_slim_capable(store, config).await?;
    Ok(store.image_slim().await?)
}

/// Validate and push image slim settings; all modes off removes the rule.
pub async fn apply_image_slim(
    store: &dyn RemoteStore,
    config: &StoreConfig,
    settings: &ImageSlimSettings,
) -> MediaResult<()> {
    settings.validate().map_err(MediaError::Validation)?;
    ensure_slim_capable(store, config).await?;
    store.set_image_slim(settings).await?;
    info!(mode = %settings.slim_mode(), suffixes = ?settings.suffixes, "image slim applied");
    Ok(())
}
