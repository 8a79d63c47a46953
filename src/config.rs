//! Configuration for the page indexer.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values;
//! the CLI applies its own flags on top of both.

use crate::error::{PageIndexError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-2024-11-20")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-2024-11-20".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How plain-text documents are cut into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMethod {
    /// Fixed number of tokens per page.
    Token,
    /// Fixed number of characters per page.
    Char,
}

/// How the TOC locator decides whether a page is a table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TocDetection {
    /// Line-pattern scoring, asking the LLM only when nothing scores.
    Heuristic,
    /// Always ask the LLM.
    Llm,
}

/// Settings consumed by the structuring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of leading pages scanned for a table of contents.
    pub toc_check_page_num: usize,
    /// Maximum pages a leaf node may cover.
    pub max_page_num_each_node: usize,
    /// Maximum tokens a leaf node may cover.
    pub max_token_num_each_node: usize,
    pub if_add_node_id: bool,
    pub if_add_node_summary: bool,
    pub if_add_doc_description: bool,
    pub if_add_node_text: bool,
    pub txt_page_method: PageMethod,
    pub txt_tokens_per_page: usize,
    pub txt_chars_per_page: usize,
    /// Tokenizer encoding name.
    pub txt_tokenizer: String,
    /// Overlap between consecutive text pages, in tokens or chars per `txt_page_method`.
    pub txt_chunk_overlap: usize,
    pub toc_detection: TocDetection,
    /// Pages per heading-inference request when no TOC is usable.
    pub fallback_window_pages: usize,
    /// Minimum similarity for a title to count as present on a page.
    pub title_match_threshold: f64,
    /// Try to find real sub-headings before cutting an oversized node into parts.
    pub split_with_headings: bool,
    /// Nodes shorter than this many tokens use their text as their summary.
    pub summary_token_threshold: usize,
    /// Attempts per LLM call, including the first.
    pub max_retries: usize,
    /// Base delay between attempts, doubled each retry.
    pub retry_backoff_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            toc_check_page_num: 20,
            max_page_num_each_node: 20,
            max_token_num_each_node: 20_000,
            if_add_node_id: true,
            if_add_node_summary: false,
            if_add_doc_description: true,
            if_add_node_text: false,
            txt_page_method: PageMethod::Token,
            txt_tokens_per_page: 1024,
            txt_chars_per_page: 2048,
            txt_tokenizer: "gpt2".to_string(),
            txt_chunk_overlap: 5,
            toc_detection: TocDetection::Heuristic,
            fallback_window_pages: 5,
            title_match_threshold: 0.8,
            split_with_headings: true,
            summary_token_threshold: 200,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl IndexConfig {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_page_num_each_node", self.max_page_num_each_node),
            ("max_token_num_each_node", self.max_token_num_each_node),
            ("txt_tokens_per_page", self.txt_tokens_per_page),
            ("txt_chars_per_page", self.txt_chars_per_page),
            ("fallback_window_pages", self.fallback_window_pages),
            ("max_retries", self.max_retries),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PageIndexError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        let page_size = match self.txt_page_method {
            PageMethod::Token => self.txt_tokens_per_page,
            PageMethod::Char => self.txt_chars_per_page,
        };
        if self.txt_chunk_overlap >= page_size {
            return Err(PageIndexError::InvalidConfig(format!(
                "txt_chunk_overlap ({}) must be smaller than the page size ({})",
                self.txt_chunk_overlap, page_size
            )));
        }

        if !(self.title_match_threshold > 0.0 && self.title_match_threshold <= 1.0) {
            return Err(PageIndexError::InvalidConfig(format!(
                "title_match_threshold must be in (0, 1], got {}",
                self.title_match_threshold
            )));
        }

        if self.txt_tokenizer.trim().is_empty() {
            return Err(PageIndexError::InvalidConfig(
                "txt_tokenizer must name an encoding".to_string(),
            ));
        }

        Ok(())
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Pipeline settings
    #[serde(default)]
    pub index: IndexConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    index: Option<IndexConfig>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/pageindex/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(tokens) = env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = tokens;
        }

        if let Some(temp) = env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()) {
            self.llm.temperature = temp;
        }

        if let Some(secs) = env::var("LLM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()) {
            self.llm.timeout_secs = secs;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PageIndexError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, filling unset values with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| PageIndexError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(index) = file_config.index {
            config.index = index;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pageindex")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the LLM endpoint is configured.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(PageIndexError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(PageIndexError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(PageIndexError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.validate_llm()?;
        self.index.validate()
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            index: IndexConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.model, "gpt-4o-2024-11-20");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.index.toc_check_page_num, 20);
        assert_eq!(config.index.max_page_num_each_node, 20);
        assert_eq!(config.index.max_token_num_each_node, 20_000);
        assert!(config.index.if_add_node_id);
        assert!(!config.index.if_add_node_summary);
        assert_eq!(config.index.txt_page_method, PageMethod::Token);
        assert_eq!(config.index.txt_tokenizer, "gpt2");
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(config.index.validate().is_ok());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "gpt-4");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.model, "gpt-4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_fit_in_page() {
        let index = IndexConfig {
            txt_page_method: PageMethod::Char,
            txt_chars_per_page: 10,
            txt_chunk_overlap: 10,
            ..Default::default()
        };
        assert!(matches!(
            index.validate(),
            Err(PageIndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let index = IndexConfig {
            max_page_num_each_node: 0,
            ..Default::default()
        };
        assert!(index.validate().is_err());

        let index = IndexConfig {
            title_match_threshold: 1.5,
            ..Default::default()
        };
        assert!(index.validate().is_err());
    }

    #[test]
    fn test_from_yaml_partial_index_section() {
        let yaml = r#"
llm:
  api_base: "https://llm.local"
  model: "small-model"
index:
  max_page_num_each_node: 8
  txt_page_method: char
  if_add_node_summary: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.llm.api_base, "https://llm.local");
        assert_eq!(config.llm.model, "small-model");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.index.max_page_num_each_node, 8);
        assert_eq!(config.index.txt_page_method, PageMethod::Char);
        assert!(config.index.if_add_node_summary);
        // untouched keys keep their defaults
        assert_eq!(config.index.toc_check_page_num, 20);
        assert_eq!(config.index.txt_chunk_overlap, 5);
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert!(matches!(
            Config::from_yaml("llm: [1, 2"),
            Err(PageIndexError::Config(_))
        ));
    }
}
