//! TOML configuration for the hub.
//!
//! ```toml
//! [db]
//! path = "./data/hub.sqlite"
//!
//! [chunking]
//! max_chars = 1500
//!
//! [storage]
//! kind = "filesystem"
//! root = "./manuals"
//!
//! [batch]
//! concurrency = 1
//! delay_ms = 1000
//!
//! [offline]
//! origin = "http://127.0.0.1:5173"
//!
//! [server]
//! bind = "127.0.0.1:8787"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use workshop_hub_core::chunk::DEFAULT_MAX_CHUNK_CHARS;
use workshop_hub_core::route::{compile, DEFAULT_API_PATTERNS, DEFAULT_CACHEABLE_PATTERNS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub offline: Option<OfflineConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}

/// Where manual PDFs live.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Filesystem(FsStorageConfig),
    S3(S3StorageConfig),
}

#[derive(Debug, Deserialize, Clone)]
pub struct FsStorageConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Pause between documents when processing sequentially.
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            delay_ms: 0,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// Offline cache worker settings.
#[derive(Debug, Deserialize, Clone)]
pub struct OfflineConfig {
    /// Upstream origin the worker fronts. Relative URLs resolve against it.
    pub origin: String,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_max_dynamic_entries")]
    pub max_dynamic_entries: usize,
    #[serde(default = "default_offline_page")]
    pub offline_page: String,
    #[serde(default = "default_static_urls")]
    pub static_urls: Vec<String>,
    #[serde(default = "default_api_patterns")]
    pub api_patterns: Vec<String>,
    #[serde(default = "default_cacheable_patterns")]
    pub cacheable_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl OfflineConfig {
    /// Settings with every default applied for `origin`.
    pub fn for_origin(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            max_dynamic_entries: default_max_dynamic_entries(),
            offline_page: default_offline_page(),
            static_urls: default_static_urls(),
            api_patterns: default_api_patterns(),
            cacheable_patterns: default_cacheable_patterns(),
            skip_waiting_on_install: true,
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }

    /// `"{prefix}-v{version}"`
    pub fn static_cache_name(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.version)
    }

    /// `"{prefix}-dynamic-v{version}"`
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic-v{}", self.cache_prefix, self.version)
    }
}

fn default_cache_prefix() -> String {
    "workshop-hub".to_string()
}
fn default_version() -> u32 {
    1
}
fn default_max_dynamic_entries() -> usize {
    100
}
fn default_offline_page() -> String {
    "/offline.html".to_string()
}
fn default_static_urls() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/offline.html"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_api_patterns() -> Vec<String> {
    DEFAULT_API_PATTERNS.iter().map(|s| s.to_string()).collect()
}
fn default_cacheable_patterns() -> Vec<String> {
    DEFAULT_CACHEABLE_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_true() -> bool {
    true
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    if config.batch.concurrency == 0 {
        anyhow::bail!("batch.concurrency must be >= 1");
    }

    if let StorageConfig::S3(ref s3) = config.storage {
        if s3.bucket.trim().is_empty() {
            anyhow::bail!("storage.bucket must not be empty");
        }
    }

    if let Some(ref offline) = config.offline {
        let origin = url::Url::parse(&offline.origin)
            .with_context(|| format!("offline.origin is not a valid URL: '{}'", offline.origin))?;
        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("offline.origin must be an http or https URL");
        }
        if offline.max_dynamic_entries == 0 {
            anyhow::bail!("offline.max_dynamic_entries must be > 0");
        }
        if offline.fetch_timeout_secs == 0 {
            anyhow::bail!("offline.fetch_timeout_secs must be > 0");
        }
        compile(&offline.api_patterns, false).context("offline.api_patterns")?;
        compile(&offline.cacheable_patterns, true).context("offline.cacheable_patterns")?;
    }

    Ok(config)
}
