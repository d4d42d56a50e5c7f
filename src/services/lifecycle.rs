//! Plugin enable / disable hooks.

use super::media_service::{MediaError, MediaResult};
use crate::config::StoreConfig;
use tracing::info;

/// Accepts activation once the settings name credentials, a bucket and a
/// region (or custom domain).
pub fn activate(config: &StoreConfig) -> MediaResult<String> {
    let missing = config.missing_fields();
    if !missing.is_empty() {
        return Err(MediaError::Validation(format!(
            "cannot enable object storage, missing: {}",
            missing.join(", ")
        )));
    }
    info!(bucket = %config.bucket, host = %config.asset_host(), "media offload activated");
    Ok(format!(
        "Object storage enabled: new uploads go to bucket {} under {}/.",
        config.bucket,
        config.base_path()
    ))
}

pub fn deactivate() -> String {
    info!("media offload deactivated");
    "Object storage disabled: attachment links fall back to local paths; \
     files already uploaded stay in the bucket."
        .to_string()
}
