use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::{env, fmt, path::PathBuf, str::FromStr};

pub const DEFAULT_BASE_PATH: &str = "usr/uploads";

/// Extensions the CMS accepts as attachments when no explicit list is configured.
const DEFAULT_ALLOWED_EXTENSIONS: [&str; 32] = [
    "gif", "jpg", "jpeg", "png", "tiff", "bmp", "webp", "avif", "svg", "ico", "mp3", "wav",
    "mp4", "mov", "wmv", "wma", "rmvb", "rm", "avi", "flv", "ogg", "oga", "ogv", "txt",
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "pdf",
];

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
}

/// Two-state toggle used by every plugin option (`open` / `close`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    Open,
    #[default]
    Close,
}

impl Switch {
    pub fn is_open(self) -> bool {
        self == Switch::Open
    }

    fn open() -> Self {
        Switch::Open
    }
}

impl FromStr for Switch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "on" | "true" | "1" => Ok(Switch::Open),
            "close" | "off" | "false" | "0" => Ok(Switch::Close),
            other => Err(format!("expected `open` or `close`, got `{other}`")),
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_open() { "open" } else { "close" })
    }
}

/// Read-only snapshot of the plugin settings, loaded once at the boundary and
/// handed to every service.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub secret_id: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub region: String,
    /// Custom origin or CDN domain. Takes precedence over the region endpoint.
    #[serde(default)]
    pub domain: Option<String>,
    pub bucket: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "Switch::open")]
    pub sign: Switch,
    #[serde(default = "Switch::open")]
    pub remote_sync: Switch,
    #[serde(default)]
    pub local: Switch,
    #[serde(default)]
    pub local_sync: Switch,
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub timezone_offset_secs: i32,
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("domain", &self.domain)
            .field("bucket", &self.bucket)
            .field("base_path", &self.base_path)
            .field("scheme", &self.scheme)
            .field("sign", &self.sign)
            .field("remote_sync", &self.remote_sync)
            .field("local", &self.local)
            .field("local_sync", &self.local_sync)
            .field("local_root", &self.local_root)
            .field("timezone_offset_secs", &self.timezone_offset_secs)
            .finish()
    }
}

impl StoreConfig {
    /// Minimal config for the given bucket/region with every option at its default.
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            domain: None,
            bucket: bucket.into(),
            base_path: default_base_path(),
            scheme: default_scheme(),
            sign: Switch::Open,
            remote_sync: Switch::Open,
            local: Switch::Close,
            local_sync: Switch::Close,
            local_root: default_local_root(),
            allowed_extensions: default_allowed_extensions(),
            timezone_offset_secs: 0,
        }
    }

    /// Object prefix for new uploads, without surrounding slashes.
    pub fn base_path(&self) -> &str {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            DEFAULT_BASE_PATH
        } else {
            trimmed
        }
    }

    /// Host every emitted asset link points at.
    pub fn asset_host(&self) -> String {
        match self.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(domain) => {
                let without_scheme = domain
                    .strip_prefix("https://")
                    .or_else(|| domain.strip_prefix("http://"))
                    .unwrap_or(domain);
                without_scheme.trim_end_matches('/').to_ascii_lowercase()
            }
            None => format!("{}.cos.{}.myqcloud.com", self.bucket, self.region).to_ascii_lowercase(),
        }
    }

    pub fn asset_base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.asset_host())
    }

    pub fn signing_enabled(&self) -> bool {
        self.sign.is_open()
    }

    pub fn keeps_local_copy(&self) -> bool {
        self.local.is_open()
    }

    pub fn deletes_local_copy(&self) -> bool {
        self.local.is_open() && self.local_sync.is_open()
    }

    pub fn deletes_remote_object(&self) -> bool {
        self.remote_sync.is_open()
    }

    /// The CMS's attachment-type predicate.
    pub fn allows_extension(&self, ext: &str) -> bool {
        !ext.is_empty()
            && self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.secret_id.trim().is_empty() {
            missing.push("secret_id");
        }
        if self.secret_key.trim().is_empty() {
            missing.push("secret_key");
        }
        if self.bucket.trim().is_empty() {
            missing.push("bucket");
        }
        let has_domain = self
            .domain
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        if self.region.trim().is_empty() && !has_domain {
            missing.push("region");
        }
        missing
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Object-storage media offload for the blog CMS")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_OFFLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_OFFLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket name, `BucketName-APPID` (overrides COS_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket region, e.g. ap-shanghai (overrides COS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom access domain (overrides COS_DOMAIN)
    #[arg(long)]
    pub domain: Option<String>,

    /// Object prefix for new uploads (overrides COS_PATH)
    #[arg(long)]
    pub base_path: Option<String>,

    /// CMS root where local copies are mirrored (overrides COS_LOCAL_ROOT)
    #[arg(long)]
    pub local_root: Option<PathBuf>,

    /// Signed links (overrides COS_SIGN)
    #[arg(long, value_enum)]
    pub sign: Option<Switch>,

    /// Validate the bucket with the configured credentials and exit
    #[arg(long)]
    pub check: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and check flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("MEDIA_OFFLOAD_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let env_port = match env::var("MEDIA_OFFLOAD_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing MEDIA_OFFLOAD_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading MEDIA_OFFLOAD_PORT"),
        };

        let mut store = StoreConfig::new(
            env::var("COS_SECRET_ID").unwrap_or_default(),
            env::var("COS_SECRET_KEY").unwrap_or_default(),
            args.region
                .or_else(|| env::var("COS_REGION").ok())
                .unwrap_or_else(|| "ap-beijing-1".into()),
            args.bucket
                .or_else(|| env::var("COS_BUCKET").ok())
                .unwrap_or_default(),
        );
        store.domain = args.domain.or_else(|| env::var("COS_DOMAIN").ok());
        if let Some(path) = args.base_path.or_else(|| env::var("COS_PATH").ok()) {
            store.base_path = path;
        }
        if let Ok(scheme) = env::var("COS_SCHEME") {
            store.scheme = scheme;
        }
        if let Some(root) = args
            .local_root
            .or_else(|| env::var("COS_LOCAL_ROOT").ok().map(PathBuf::from))
        {
            store.local_root = root;
        }
        store.sign = match args.sign {
            Some(sign) => sign,
            None => env_switch("COS_SIGN", store.sign)?,
        };
        store.remote_sync = env_switch("COS_REMOTE_SYNC", store.remote_sync)?;
        store.local = env_switch("COS_LOCAL", store.local)?;
        store.local_sync = env_switch("COS_LOCAL_SYNC", store.local_sync)?;
        if let Ok(types) = env::var("COS_ALLOWED_TYPES") {
            store.allowed_extensions = types
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        if let Ok(value) = env::var("COS_TIMEZONE_OFFSET") {
            store.timezone_offset_secs = value
                .parse()
                .with_context(|| format!("parsing COS_TIMEZONE_OFFSET value `{}`", value))?;
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            store,
        };

        Ok((cfg, args.check))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_switch(name: &str, default: Switch) -> Result<Switch> {
    match env::var(name) {
        Ok(value) => value
            .parse::<Switch>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
