//! COS request signing (HMAC-SHA1, `q-sign-algorithm=sha1`).
//!
//! The same authorization string authenticates API requests (as the
//! `Authorization` header) and presigned links (percent-encoded into the
//! `sign` query parameter). A presigned link therefore embeds its expiry as
//! `q-key-time%3D<start>%3B<end>%26q...`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// Secret pair plus the signing routine.
#[derive(Clone)]
pub struct RequestSigner {
    secret_id: String,
    secret_key: String,
}

impl RequestSigner {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Build the `q-sign-algorithm=sha1&...&q-signature=...` string.
    ///
    /// `path` is the decoded object path with a leading `/`. Parameter and
    /// header names are lowercased and sorted before hashing.
    pub fn authorization(
        &self,
        method: &str,
        path: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
        start: i64,
        end: i64,
    ) -> String {
        let key_time = format!("{};{}", start, end);
        let sign_key = hmac_sha1_hex(self.secret_key.as_bytes(), key_time.as_bytes());

        let (param_list, http_params) = canonical_pairs(params);
        let (header_list, http_headers) = canonical_pairs(headers);
        let http_string = format!(
            "{}\n{}\n{}\n{}\n",
            method.to_ascii_lowercase(),
            path,
            http_params,
            http_headers
        );
        let string_to_sign = format!(
            "sha1\n{}\n{}\n",
            key_time,
            hex::encode(Sha1::digest(http_string.as_bytes()))
        );
        let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

        format!(
            "q-sign-algorithm=sha1&q-ak={}&q-sign-time={}&q-key-time={}&q-header-list={}&q-url-param-list={}&q-signature={}",
            self.secret_id, key_time, key_time, header_list, param_list, signature
        )
    }

    /// Time-limited GET link for `key` under `base_url` (`scheme://host`).
    pub fn presigned_url(
        &self,
        base_url: &str,
        host: &str,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> String {
        let start = now.timestamp();
        let end = start + ttl.as_secs() as i64;
        let path = format!("/{}", key.trim_start_matches('/'));
        let auth = self.authorization("get", &path, &[], &[("host", host)], start, end);
        format!(
            "{}{}?sign={}",
            base_url.trim_end_matches('/'),
            encode_path(&path),
            urlencoding::encode(&auth)
        )
    }
}

/// Percent-encode each path segment, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `(name;name, name=value&name=value)` over lowercased, sorted pairs.
fn canonical_pairs(pairs: &[(&str, &str)]) -> (String, String) {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k.to_ascii_lowercase()).into_owned(),
                urlencoding::encode(v).into_owned(),
            )
        })
        .collect();
    encoded.sort();

    let list = encoded
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    (list, joined)
}

fn hmac_sha1_hex(key: &[u8], message: &[u8]) -> String {
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}
