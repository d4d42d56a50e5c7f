//! Re-signs expired asset links inside rendered post content.
//!
//! Published HTML keeps whatever signed links were current when it was
//! saved. On render every URL pointing at the asset host is checked; links
//! whose embedded expiry has passed are swapped for a freshly minted one
//! over the same object. Everything else is left byte-for-byte alone, so
//! running the pass twice changes nothing the second time.

use super::link_resolver::{LinkResolver, REWRITE_LINK_TTL};
use crate::config::StoreConfig;
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};
use tracing::debug;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)https?://[-A-Za-z0-9+&@#/%?=~_|!:,.;]+[-A-Za-z0-9+&@#/%=~_|]").unwrap()
    })
}

#[derive(Clone)]
pub struct ContentRewriter {
    config: Arc<StoreConfig>,
    resolver: LinkResolver,
}

impl ContentRewriter {
    pub fn new(config: Arc<StoreConfig>, resolver: LinkResolver) -> Self {
        Self { config, resolver }
    }

    pub fn rewrite(&self, html: &str) -> String {
        self.rewrite_at(html, Utc::now())
    }

    pub fn rewrite_at(&self, html: &str, now: DateTime<Utc>) -> String {
        if !self.config.signing_enabled() {
            return html.to_string();
        }
        let host = self.config.asset_host();
        let now_ts = now.timestamp();

        url_regex()
            .replace_all(html, |caps: &Captures| {
                let url = &caps[0];
                self.refresh(url, &host, now_ts, now)
                    .unwrap_or_else(|| url.to_string())
            })
            .into_owned()
    }

    /// Fresh link for `url` if it is an expired link on our host.
    fn refresh(&self, url: &str, host: &str, now_ts: i64, now: DateTime<Utc>) -> Option<String> {
        if !url_host(url).eq_ignore_ascii_case(host) {
            return None;
        }
        let expiry = embedded_expiry(url)?;
        if expiry > now_ts {
            return None;
        }
        let key = object_key(url)?;
        debug!(key = %key, expiry, "re-signing expired asset link");
        Some(self.resolver.mint(&key, REWRITE_LINK_TTL, now))
    }
}

/// Authority part of `url`, without scheme, path or query.
fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

/// End of the key-time window, read from either the percent-encoded or the
/// plain form of the `sign` parameter.
fn embedded_expiry(url: &str) -> Option<i64> {
    let field = |marker: &str, terminator: &str, separator: &str| {
        let after = url.split_once(marker)?.1;
        let window = after.split(terminator).next()?;
        window.split(separator).nth(1)?.trim().parse::<i64>().ok()
    };
    field("q-key-time%3D", "%26", "%3B").or_else(|| field("q-key-time=", "&", ";"))
}

/// Object key of an asset URL: path only, percent-decoded, no leading `/`.
fn object_key(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = &rest[rest.find('/')?..];
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path).ok()?;
    let key = decoded.trim_start_matches('/');
    (!key.is_empty()).then(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Switch, services::memory_store::MemoryStore};
    use chrono::{Duration, TimeZone};

    const HOST: &str = "b-1250000000.cos.ap-beijing.myqcloud.com";

    fn rewriter(sign: Switch) -> (ContentRewriter, LinkResolver) {
        let mut config = StoreConfig::new("AKIDexample", "secret", "ap-beijing", "b-1250000000");
        config.sign = sign;
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new(&config));
        let resolver = LinkResolver::new(config.clone(), store);
        (ContentRewriter::new(config, resolver.clone()), resolver)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn expired_link_is_reminted_with_rewrite_window() {
        let (rewriter, resolver) = rewriter(Switch::Open);
        let stale = resolver.resolve_at("usr/uploads/2024/03/a b.png", now() - Duration::hours(2));
        let html = format!(r#"<p><img src="{}" alt="x"></p>"#, stale);

        let out = rewriter.rewrite_at(&html, now());

        let fresh = resolver.mint("usr/uploads/2024/03/a b.png", REWRITE_LINK_TTL, now());
        assert_eq!(out, format!(r#"<p><img src="{}" alt="x"></p>"#, fresh));
        assert_eq!(embedded_expiry(&fresh), Some(now().timestamp() + 600));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let (rewriter, resolver) = rewriter(Switch::Open);
        let stale = resolver.resolve_at("usr/uploads/2024/03/abc.png", now() - Duration::hours(2));
        let html = format!("see {} and {}", stale, stale);

        let once = rewriter.rewrite_at(&html, now());
        let twice = rewriter.rewrite_at(&once, now());
        assert_ne!(once, html);
        assert_eq!(once, twice);
    }

    #[test]
    fn fresh_and_foreign_links_are_untouched() {
        let (rewriter, resolver) = rewriter(Switch::Open);
        let fresh = resolver.resolve_at("usr/uploads/2024/03/abc.png", now());
        let foreign = "https://cdn.other.example/usr/uploads/a.png?sign=q-key-time%3D1%3B2%26q";
        let html = format!("<a href=\"{}\">x</a> <img src=\"{}\">", fresh, foreign);

        assert_eq!(rewriter.rewrite_at(&html, now()), html);
    }

    #[test]
    fn unsigned_asset_links_are_left_alone() {
        let (rewriter, _) = rewriter(Switch::Open);
        let html = format!("<img src=\"https://{}/usr/uploads/2024/03/abc.png\">", HOST);
        assert_eq!(rewriter.rewrite_at(&html, now()), html);
    }

    #[test]
    fn no_op_when_signing_is_closed() {
        let (rewriter, _) = rewriter(Switch::Close);
        let html = format!(
            "<img src=\"https://{}/a.png?sign=q-key-time%3D1%3B2%26q-signature%3Dx\">",
            HOST
        );
        assert_eq!(rewriter.rewrite_at(&html, now()), html);
    }

    #[test]
    fn expiry_and_key_parsing() {
        let url = format!(
            "https://{}/usr/uploads/2024/03/a%20b.png?sign=q-sign-algorithm%3Dsha1%26q-key-time%3D100%3B200%26q-header-list%3Dhost",
            HOST
        );
        assert_eq!(url_host(&url), HOST);
        assert_eq!(embedded_expiry(&url), Some(200));
        assert_eq!(object_key(&url).as_deref(), Some("usr/uploads/2024/03/a b.png"));

        assert_eq!(embedded_expiry("https://h/a.png?q-key-time=5;9&q-ak=x"), Some(9));
        assert_eq!(embedded_expiry("https://h/a.png"), None);
        assert_eq!(object_key("https://h"), None);
    }
}
