/// Configuration module for devintel.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::router::EmbeddingProvider;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./collections.db".to_string()
}

fn default_chunk_size() -> usize {
    512
}

fn default_search_top_k() -> usize {
    5
}

fn default_file_extensions() -> Vec<String> {
    ["py", "js", "ts", "rs", "go", "md", "txt"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/__pycache__/**",
        "**/.git/**",
        "**/target/**",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    1024
}

fn default_code_profile() -> EmbeddingProfileConfig {
    EmbeddingProfileConfig {
        provider: EmbeddingProvider::OpenAi,
        model: "text-embedding-3-small".to_string(),
        dimensions: 1536,
        url: None,
    }
}

fn default_documentation_profile() -> EmbeddingProfileConfig {
    EmbeddingProfileConfig {
        provider: EmbeddingProvider::Ollama,
        model: "nomic-embed-text".to_string(),
        dimensions: 768,
        url: None,
    }
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Extensions (without the dot) picked up when indexing a directory.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    /// Glob patterns, relative to the indexed root, that are never indexed.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub query_cache: QueryCacheConfig,

    #[serde(default)]
    pub profiles: ProfilesConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EmbeddingProfileConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProfilesConfig {
    #[serde(default = "default_code_profile")]
    pub code: EmbeddingProfileConfig,

    #[serde(default = "default_documentation_profile")]
    pub documentation: EmbeddingProfileConfig,

    #[serde(default = "default_code_profile")]
    pub conversation: EmbeddingProfileConfig,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            chunk_size: default_chunk_size(),
            search_top_k: default_search_top_k(),
            file_extensions: default_file_extensions(),
            exclude_patterns: default_exclude_patterns(),
            query_cache: QueryCacheConfig::default(),
            profiles: ProfilesConfig::default(),
        }
    }
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            code: default_code_profile(),
            documentation: default_documentation_profile(),
            conversation: default_code_profile(),
        }
    }
}

impl ProfilesConfig {
    /// Every profile uses the mock embedder with the given dimensionality.
    pub fn mock(dimensions: usize) -> Self {
        let profile = EmbeddingProfileConfig {
            provider: EmbeddingProvider::Mock,
            model: "mock".to_string(),
            dimensions,
            url: None,
        };
        Self {
            code: profile.clone(),
            documentation: profile.clone(),
            conversation: profile,
        }
    }

    /// Keep each profile's dimensionality but embed locally with the mock
    /// embedder. Used for offline runs.
    #[must_use]
    pub fn offline(mut self) -> Self {
        for profile in [
            &mut self.code,
            &mut self.documentation,
            &mut self.conversation,
        ] {
            profile.provider = EmbeddingProvider::Mock;
        }
        self
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &EmbeddingProfileConfig)> {
        [
            ("code", &self.code),
            ("documentation", &self.documentation),
            ("conversation", &self.conversation),
        ]
        .into_iter()
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template.
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

        let mut cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");

        // Accept ".py" as well as "py"
        for ext in &mut cfg.file_extensions {
            *ext = ext.trim_start_matches('.').to_string();
        }

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
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            !self.file_extensions.is_empty(),
            "at least one file extension must be specified"
        );
        anyhow::ensure!(
            !self.query_cache.enabled || self.query_cache.ttl_secs > 0,
            "query_cache.ttl_secs must be positive when the cache is enabled"
        );
        for (name, profile) in self.profiles.iter() {
            anyhow::ensure!(
                profile.dimensions > 0,
                "profiles.{name}.dimensions must be positive"
            );
            anyhow::ensure!(
                !profile.model.is_empty(),
                "profiles.{name}.model must not be empty"
            );
        }
        self.exclude_set()?;
        Ok(())
    }

    /// Compile `exclude_patterns` into a matcher.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob =
                Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {pattern}"))?;
            builder.add(glob);
        }
        builder.build().context("failed to build exclude set")
    }
}

// ── Tests ────────────────────────────────────────────────────────────
