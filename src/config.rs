//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`] and passed by reference into
//! every gateway constructor. See `config/pchk.example.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use policy_check_core::analyzer::{DEFAULT_TOP_K, MAX_TOP_K};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where uploaded policy files are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

/// Character-window chunking.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Matches scoring below this cosine similarity are dropped.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            min_score: None,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_max_top_k() -> usize {
    MAX_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierConfig {
    /// Infer missing department/policy type filters with the generation model.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    /// Upper bound on `limit` for log listings.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
        }
    }
}

fn default_max_limit() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.max_top_k < 1 {
        anyhow::bail!("retrieval.max_top_k must be >= 1");
    }
    if config.retrieval.default_top_k < 1
        || config.retrieval.default_top_k > config.retrieval.max_top_k
    {
        anyhow::bail!(
            "retrieval.default_top_k must be between 1 and retrieval.max_top_k ({})",
            config.retrieval.max_top_k
        );
    }
    if let Some(min) = config.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.classifier.enabled && !config.generation.is_enabled() {
        anyhow::bail!("classifier.enabled requires a generation provider");
    }

    if config.logs.max_limit == 0 {
        anyhow::bail!("logs.max_limit must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/pchk.sqlite"

[storage]
dir = "./data/policies"

[server]
bind = "127.0.0.1:8000"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 2000);
        assert_eq!(cfg.chunking.overlap, 200);
        assert_eq!(cfg.retrieval.default_top_k, 5);
        assert_eq!(cfg.retrieval.max_top_k, 20);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.generation.model, "gpt-4.1-mini");
        assert!(!cfg.classifier.enabled);
        assert_eq!(cfg.logs.max_limit, 100);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let text = format!("{}\n[chunking]\nchunk_size = 100\noverlap = 100\n", MINIMAL);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_embedding_needs_model_and_dims() {
        let text = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());

        let text = format!(
            "{}\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
            MINIMAL
        );
        assert!(parse_config(&text).is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let text = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());

        let text = format!("{}\n[generation]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_classifier_requires_generation() {
        let text = format!("{}\n[classifier]\nenabled = true\n", MINIMAL);
        assert!(parse_config(&text).is_err());

        let text = format!(
            "{}\n[classifier]\nenabled = true\n\n[generation]\nprovider = \"openai\"\n",
            MINIMAL
        );
        assert!(parse_config(&text).is_ok());
    }

    #[test]
    fn test_default_top_k_within_max() {
        let text = format!(
            "{}\n[retrieval]\ndefault_top_k = 30\nmax_top_k = 20\n",
            MINIMAL
        );
        assert!(parse_config(&text).is_err());
    }
}
