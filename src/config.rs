//! TOML configuration for `ctopics`.
//!
//! One file describes the input table, the aggregation policy, topic
//! engine tunables, the embedding provider, and output locations. See
//! [`load_config`] for validation rules.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use convo_topics_core::aggregate::SequencePolicy;
use convo_topics_core::engine::EngineSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Jsonl,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
    /// Inferred from the file extension when absent.
    #[serde(default)]
    pub format: Option<InputFormat>,
}

impl InputConfig {
    pub fn resolved_format(&self) -> InputFormat {
        self.format.unwrap_or_else(|| infer_format(&self.path))
    }
}

/// `.jsonl` / `.ndjson` are JSON lines; everything else is read as CSV.
pub fn infer_format(path: &Path) -> InputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
            InputFormat::Jsonl
        }
        _ => InputFormat::Csv,
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AggregationConfig {
    #[serde(default)]
    pub sequence_policy: SequencePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicsConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub calculate_probabilities: bool,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Defaults to `min_cluster_size`.
    #[serde(default)]
    pub min_samples: Option<usize>,
    #[serde(default = "default_top_n_words")]
    pub top_n_words: usize,
    #[serde(default = "default_true")]
    pub stop_words: bool,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            calculate_probabilities: true,
            min_cluster_size: default_min_cluster_size(),
            min_samples: None,
            top_n_words: default_top_n_words(),
            stop_words: true,
            max_features: default_max_features(),
        }
    }
}

impl TopicsConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            min_cluster_size: self.min_cluster_size,
            min_samples: self.min_samples.unwrap_or(self.min_cluster_size),
            top_n_words: self.top_n_words,
            stop_words: self.stop_words,
        }
    }
}

fn default_language() -> String {
    "english".to_string()
}
fn default_true() -> bool {
    true
}
fn default_min_cluster_size() -> usize {
    10
}
fn default_top_n_words() -> usize {
    10
}
fn default_max_features() -> usize {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "lexical".to_string()
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
pub struct OutputConfig {
    /// Labeled dataset (CSV).
    pub dataset: PathBuf,
    /// Serialized topic model; not written when absent.
    #[serde(default)]
    pub model: Option<PathBuf>,
    #[serde(default)]
    pub include_probabilities: bool,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let topics = &config.topics;
    if topics.min_cluster_size < 2 {
        anyhow::bail!("topics.min_cluster_size must be >= 2");
    }
    if topics.min_samples == Some(0) {
        anyhow::bail!("topics.min_samples must be >= 1");
    }
    if topics.top_n_words == 0 {
        anyhow::bail!("topics.top_n_words must be > 0");
    }
    if topics.max_features == 0 {
        anyhow::bail!("topics.max_features must be > 0");
    }
    if topics.language.trim().is_empty() {
        anyhow::bail!("topics.language must not be empty");
    }

    if config.output.include_probabilities && !topics.calculate_probabilities {
        anyhow::bail!("output.include_probabilities requires topics.calculate_probabilities = true");
    }

    let embedding = &config.embedding;
    if embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match embedding.provider.as_str() {
        "lexical" | "local" => {}
        "openai" | "ollama" => {
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be lexical, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
