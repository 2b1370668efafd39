/// Configuration module for paperrag.
///
/// Handles loading, validating, and providing default configuration values.
/// Credentials are never part of the file; the CLI reads them from the
/// environment.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::answer::AnswerOptions;
use crate::indexer::chunker::{ChunkerOptions, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::llm::openai::DEFAULT_API_BASE;
use crate::retriever::{ALL_SECTIONS, DEFAULT_TOP_K, SectionFilter};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Upper bound accepted for `search_top_k`.
const MAX_TOP_K: usize = 50;

// ── Default value functions ──────────────────────────────────────────

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_search_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_section_filter() -> String {
    ALL_SECTIONS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_completion_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> usize {
    1000
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Section label to search by default; "All Sections" disables filtering.
    #[serde(default = "default_section_filter")]
    pub section_filter: String,

    #[serde(default = "default_true")]
    pub show_sources: bool,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Directory holding `model.onnx` and the tokenizer files.
    #[serde(default = "default_model_dir")]
    pub dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            section_filter: default_section_filter(),
            show_sources: default_true(),
            model: ModelConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dir: default_model_dir(),
            dimensions: default_dimensions(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path only.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(
            (1..=MAX_TOP_K).contains(&self.search_top_k),
            "search_top_k must be between 1 and {MAX_TOP_K}"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.completion.temperature),
            "completion.temperature must be between 0 and 2"
        );
        anyhow::ensure!(
            self.completion.max_tokens > 0,
            "completion.max_tokens must be positive"
        );
        Ok(())
    }

    #[must_use]
    pub fn chunker_options(&self) -> ChunkerOptions {
        ChunkerOptions::new(self.chunk_size, self.chunk_overlap)
    }

    #[must_use]
    pub fn answer_options(&self) -> AnswerOptions {
        AnswerOptions {
            model: self.completion.model.clone(),
            temperature: self.completion.temperature,
            max_tokens: self.completion.max_tokens,
            show_sources: self.show_sources,
        }
    }

    #[must_use]
    pub fn section_filter(&self) -> SectionFilter {
        SectionFilter::from_label(&self.section_filter)
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.model.dir)
    }

    #[must_use]
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion.timeout_secs)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.search_top_k, 5);
        assert_eq!(config.section_filter, "All Sections");
        assert!(config.show_sources);
        assert_eq!(config.model.dimensions, 384);
        assert_eq!(config.model.name, "all-MiniLM-L6-v2");
        assert_eq!(config.completion.model, "gpt-4");
        assert!((config.completion.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 1000, "completion": {"model": "gpt-4o-mini"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        // Other fields should have defaults
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.completion.max_tokens, 1000);
        assert_eq!(config.model.dimensions, 384);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_overlap_not_smaller_than_size() {
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.search_top_k = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search_top_k = 51;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.completion.temperature = 2.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.completion.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_custom_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config, Config::default());
        // No template for non-default paths
        assert!(!path.exists());
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.search_top_k = 8;
        config.section_filter = "Methods".to_string();
        config.save(path).unwrap();

        let loaded = Config::load(path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.section_filter(),
            SectionFilter::Section("Methods".into())
        );
    }

    #[test]
    fn test_derived_options() {
        let mut config = Config::default();
        config.show_sources = false;

        let chunker = config.chunker_options();
        assert_eq!(chunker.chunk_size, 500);
        assert_eq!(chunker.chunk_overlap, 100);

        let answer = config.answer_options();
        assert_eq!(answer.model, "gpt-4");
        assert!(!answer.show_sources);

        assert_eq!(config.section_filter(), SectionFilter::All);
        assert_eq!(config.completion_timeout(), Duration::from_secs(60));
    }
}
