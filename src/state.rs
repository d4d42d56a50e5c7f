//! Shared handler state: the config snapshot and the services built on it.

use crate::{
    config::StoreConfig,
    services::{
        content_rewriter::ContentRewriter, link_resolver::LinkResolver,
        media_service::MediaService, remote_store::RemoteStore,
    },
};
use std::{env, path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<StoreConfig>,
    pub store: Arc<dyn RemoteStore>,
    pub media: MediaService,
    pub resolver: LinkResolver,
    pub rewriter: ContentRewriter,
    /// Where multipart uploads are spooled before they reach the store.
    pub spool_dir: PathBuf,
}

impl AppState {
    pub fn new(config: StoreConfig, store: Arc<dyn RemoteStore>) -> Self {
        let config = Arc::new(config);
        let resolver = LinkResolver::new(config.clone(), store.clone());
        Self {
            media: MediaService::new(config.clone(), store.clone()),
            rewriter: ContentRewriter::new(config.clone(), resolver.clone()),
            resolver,
            store,
            config,
            spool_dir: env::temp_dir(),
        }
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }
}
