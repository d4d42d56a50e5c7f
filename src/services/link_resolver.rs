//! Outward-facing URLs for stored objects.

use super::remote_store::RemoteStore;
use crate::config::StoreConfig;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

/// Lifetime of links handed out for attachment display.
pub const DISPLAY_LINK_TTL: Duration = Duration::from_secs(60 * 60);
/// Lifetime of links minted while re-signing rendered content.
pub const REWRITE_LINK_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct LinkResolver {
    config: Arc<StoreConfig>,
    store: Arc<dyn RemoteStore>,
}

impl LinkResolver {
    pub fn new(config: Arc<StoreConfig>, store: Arc<dyn RemoteStore>) -> Self {
        Self { config, store }
    }

    pub fn resolve(&self, key: &str) -> String {
        self.resolve_at(key, Utc::now())
    }

    /// Signed display link when signing is on, permanent URL otherwise.
    pub fn resolve_at(&self, key: &str, now: DateTime<Utc>) -> String {
        if self.config.signing_enabled() {
            self.mint(key, DISPLAY_LINK_TTL, now)
        } else {
            self.store.unsigned_url(key)
        }
    }

    pub fn mint(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        self.store.signed_url(key, ttl, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Switch, services::memory_store::MemoryStore};
    use chrono::TimeZone;

    fn resolver(sign: Switch) -> LinkResolver {
        let mut config = StoreConfig::new("AKIDexample", "secret", "ap-beijing", "b-1250000000");
        config.sign = sign;
        let store = Arc::new(MemoryStore::new(&config));
        LinkResolver::new(Arc::new(config), store)
    }

    fn key_time(url: &str) -> String {
        let encoded = url.split("q-key-time%3D").nth(1).unwrap();
        encoded.split("%26").next().unwrap().to_string()
    }

    #[test]
    fn signed_display_link_expires_in_an_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let start = now.timestamp();

        let url = resolver(Switch::Open).resolve_at("usr/uploads/2024/03/abc.png", now);

        assert!(url.starts_with(
            "https://b-1250000000.cos.ap-beijing.myqcloud.com/usr/uploads/2024/03/abc.png?sign="
        ));
        assert_eq!(key_time(&url), format!("{}%3B{}", start, start + 3600));
    }

    #[test]
    fn rewrite_window_is_ten_minutes() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let start = now.timestamp();

        let url = resolver(Switch::Open).mint("usr/uploads/2024/03/abc.png", REWRITE_LINK_TTL, now);

        assert_eq!(key_time(&url), format!("{}%3B{}", start, start + 600));
    }

    #[test]
    fn unsigned_when_signing_is_closed() {
        let url = resolver(Switch::Close).resolve("usr/uploads/2024/03/abc.png");
        assert_eq!(
            url,
            "https://b-1250000000.cos.ap-beijing.myqcloud.com/usr/uploads/2024/03/abc.png"
        );
    }
}
