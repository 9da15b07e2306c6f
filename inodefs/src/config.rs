use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HTTP_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store URL, e.g. `file:///var/lib/inodefs` or `s3://bucket/prefix`.
    pub url: String,
    /// Passed through to the object store builder (credentials, region, endpoint).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Resolve `..` to the parent directory instead of the directory itself.
    #[serde(default)]
    pub resolve_parent_entry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,
}

fn default_http_addr() -> SocketAddr {
    DEFAULT_HTTP_ADDR
}

fn default_stats_interval_secs() -> u64 {
    DEFAULT_STATS_INTERVAL_SECS
}

fn default_gc_interval_secs() -> u64 {
    DEFAULT_GC_INTERVAL_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_gc_interval_secs(),
        }
    }
}

impl GcConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        if settings.storage.url.trim().is_empty() {
            anyhow::bail!("storage.url must not be empty");
        }
        Ok(settings)
    }

    pub fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            anyhow::bail!("{} already exists, refusing to overwrite", path.display());
        }
        std::fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }
}

pub fn default_config_template() -> String {
    format!(
        r#"# InodeFS configuration

[storage]
# Where the key-value store keeps its data. Supported schemes include
# file://, memory://, s3://, gs:// and az://
url = "file:///var/lib/inodefs/data"

# Extra object store options, e.g. for S3:
# [storage.options]
# aws_access_key_id = "..."
# aws_secret_access_key = "..."
# aws_region = "us-east-1"

[server]
http_addr = "{DEFAULT_HTTP_ADDR}"
# How often the statistics table is logged
stats_interval_secs = {DEFAULT_STATS_INTERVAL_SECS}

[namespace]
# When true, iterate offset 1 ("..") reports the parent directory instead
# of the directory itself
resolve_parent_entry = false

[gc]
# Seconds between garbage collection rounds for deleted large files
interval_secs = {DEFAULT_GC_INTERVAL_SECS}
"#
    )
}
