use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest chunks fetched per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum top similarity required for a grounded answer.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Maximum snippet blocks carried into the grounded prompt.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    /// Fixed reply issued when no snippet clears the threshold.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
            max_sources: default_max_sources(),
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_confidence_threshold() -> f64 {
    0.35
}
fn default_max_sources() -> usize {
    3
}
fn default_fallback_message() -> String {
    "This seems outside my current knowledge base. Please reach out via the \
     Contact page (/contact) and we'll get back to you quickly."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Base URL of the Ollama-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Generation model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Embedding model identifier.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    /// Embedding vector dimensionality.
    #[serde(default = "default_embed_dims")]
    pub embed_dims: usize,
    /// Per-call timeout for embed requests, in seconds.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    /// Per-call timeout for generate requests, in seconds.
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embed_model: default_embed_model(),
            embed_dims: default_embed_dims(),
            embed_timeout_secs: default_embed_timeout_secs(),
            generate_timeout_secs: default_generate_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:latest".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embed_dims() -> usize {
    768
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_generate_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Shared secret checked against the `X-API-KEY` header.
    #[serde(default)]
    pub api_key: Option<String>,
    /// When false (the default) the API is unauthenticated.
    #[serde(default)]
    pub require_api_key: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    /// FAQ CSV with `Question` and `Answer` columns.
    pub csv_path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..1.0).contains(&config.retrieval.confidence_threshold)
        || config.retrieval.confidence_threshold == 0.0
    {
        anyhow::bail!("retrieval.confidence_threshold must be in (0.0, 1.0)");
    }
    if config.retrieval.max_sources == 0 {
        anyhow::bail!("retrieval.max_sources must be >= 1");
    }

    // Validate llm
    if config.llm.embed_dims == 0 {
        anyhow::bail!("llm.embed_dims must be > 0");
    }

    if config.server.require_api_key && config.server.api_key.is_none() {
        anyhow::bail!("server.api_key must be set when require_api_key is true");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let f = write_config(
            r#"
[db]
path = "/tmp/ragb.sqlite"

[server]
bind = "127.0.0.1:7331"
"#,
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.size, 800);
        assert_eq!(config.chunking.overlap, 120);
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.confidence_threshold - 0.35).abs() < 1e-9);
        assert_eq!(config.llm.embed_dims, 768);
        assert!(!config.server.require_api_key);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let f = write_config(
            r#"
[db]
path = "/tmp/ragb.sqlite"

[retrieval]
confidence_threshold = 1.5

[server]
bind = "127.0.0.1:7331"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_require_api_key_without_key_rejected() {
        let f = write_config(
            r#"
[db]
path = "/tmp/ragb.sqlite"

[server]
bind = "127.0.0.1:7331"
require_api_key = true
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
