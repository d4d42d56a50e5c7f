use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{cos_client::CosClient, remote_store::RemoteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + check flag ---
    let (cfg, check) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting media offload with config: {:?}", cfg);

    // --- Initialize object store client ---
    let store: Arc<dyn RemoteStore> =
        Arc::new(CosClient::new(&cfg.store).context("building COS client")?);

    // --- Handle check mode ---
    if check {
        services::settings::validate_bucket(store.as_ref(), &cfg.store)
            .await
            .with_context(|| format!("validating bucket `{}`", cfg.store.bucket))?;
        tracing::info!("Bucket {} is reachable.", cfg.store.bucket);
        return Ok(()); // exit after check
    }

    if !cfg.store.missing_fields().is_empty() {
        tracing::warn!(
            "Incomplete store settings, missing: {}",
            cfg.store.missing_fields().join(", ")
        );
    }
    if cfg.store.keeps_local_copy() && !cfg.store.local_root.exists() {
        tokio::fs::create_dir_all(&cfg.store.local_root).await?;
        tracing::info!("Created local root at {}", cfg.store.local_root.display());
    }

    // --- Build router ---
    let state = state::AppState::new(cfg.store.clone(), store);
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
