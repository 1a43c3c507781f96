use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    4000
}
fn default_overlap_chars() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct LexicalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub endpoint: String,
    #[serde(default = "default_index_name")]
    pub index: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Environment variable holding the admin API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl RemoteConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

fn default_index_name() -> String {
    "docs-chunks".to_string()
}
fn default_page_size() -> usize {
    1000
}
fn default_api_key_env() -> String {
    "DOCDEX_SEARCH_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_embedding_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_s")]
    pub base_delay_s: f64,
    #[serde(default = "default_max_delay_s")]
    pub max_delay_s: f64,
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_s: default_base_delay_s(),
            max_delay_s: default_max_delay_s(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_s),
            max_delay: Duration::from_secs_f64(self.max_delay_s),
            jitter_ratio: self.jitter_ratio,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_s() -> f64 {
    0.5
}
fn default_max_delay_s() -> f64 {
    8.0
}
fn default_jitter_ratio() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThrottleConfig {
    #[serde(default = "default_throttle_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_pause_s")]
    pub max_pause_s: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: default_throttle_enabled(),
            max_pause_s: default_max_pause_s(),
        }
    }
}

fn default_throttle_enabled() -> bool {
    true
}
fn default_max_pause_s() -> f64 {
    60.0
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.lexical.limit == 0 {
        anyhow::bail!("lexical.limit must be >= 1");
    }

    if config.retry.base_delay_s < 0.0 || config.retry.max_delay_s < 0.0 {
        anyhow::bail!("retry delays must be non-negative");
    }
    if config.retry.jitter_ratio < 0.0 {
        anyhow::bail!("retry.jitter_ratio must be non-negative");
    }

    if let Some(ref remote) = config.remote {
        if remote.endpoint.trim().is_empty() {
            anyhow::bail!("remote.endpoint must not be empty");
        }
        if remote.page_size == 0 {
            anyhow::bail!("remote.page_size must be >= 1");
        }
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
