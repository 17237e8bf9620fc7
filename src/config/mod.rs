//! Configuration management for hybrid-rag
//!
//! TOML file with environment overrides, validated as a whole so every
//! problem is reported at once.

use crate::error::{RagError, Result};
use crate::retrieval::{FusionConfig, FusionMethod, StagingConfig, DEFAULT_RRF_K};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Prefix of environment overrides: `HYBRID_RAG_SECTION__KEY=value`
pub const ENV_PREFIX: &str = "HYBRID_RAG_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub fusion: FusionSettings,
    pub search: SearchSettings,
    pub staging: StagingConfig,
    pub cache: CacheSettings,
    pub embedding: EmbeddingConfig,
    pub sparse: SparseConfig,
    pub optimizer: OptimizerConfig,
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Default fusion for searches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionSettings {
    pub method: FusionMethod,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub rrf_k: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub timeout_ms: u64,
    pub top_k: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Sqlite,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// SQLite database file, used by the sqlite backend
    pub path: PathBuf,
    pub ttl_secs: u64,
    pub io_timeout_ms: u64,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Sparse (keyword) retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseConfig {
    /// Edit distance for fuzzy term matching, 0 disables it
    pub fuzziness: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub weight_min: f64,
    pub weight_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub k_values: Vec<usize>,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_method: Option<FusionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            RagError::Configuration(format!("Unknown profile: {}", profile))
        })?;

        if let Some(method) = overrides.fusion_method {
            self.fusion.method = method;
        }
        if let Some(weight) = overrides.dense_weight {
            self.fusion.dense_weight = weight;
        }
        if let Some(weight) = overrides.sparse_weight {
            self.fusion.sparse_weight = weight;
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: HYBRID_RAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    /// Set one `SECTION__KEY` value from its string form
    pub fn set_value(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "FUSION__METHOD" => self.fusion.method = FusionMethod::from_str(value)?,
            "FUSION__DENSE_WEIGHT" => self.fusion.dense_weight = parse_value(path, value)?,
            "FUSION__SPARSE_WEIGHT" => self.fusion.sparse_weight = parse_value(path, value)?,
            "FUSION__RRF_K" => self.fusion.rrf_k = parse_value(path, value)?,
            "SEARCH__TIMEOUT_MS" => self.search.timeout_ms = parse_value(path, value)?,
            "SEARCH__TOP_K" => self.search.top_k = parse_value(path, value)?,
            "STAGING__STAGE1_K" => self.staging.stage1_k = parse_value(path, value)?,
            "STAGING__STAGE2_K" => self.staging.stage2_k = parse_value(path, value)?,
            "CACHE__ENABLED" => self.cache.enabled = parse_value(path, value)?,
            "CACHE__BACKEND" => {
                self.cache.backend = match value {
                    "memory" => CacheBackendKind::Memory,
                    "sqlite" => CacheBackendKind::Sqlite,
                    other => {
                        return Err(RagError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Unknown cache backend '{}'", other),
                        })
                    }
                }
            }
            "CACHE__PATH" => self.cache.path = PathBuf::from(value),
            "CACHE__TTL_SECS" => self.cache.ttl_secs = parse_value(path, value)?,
            "CACHE__IO_TIMEOUT_MS" => self.cache.io_timeout_ms = parse_value(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "SPARSE__FUZZINESS" => self.sparse.fuzziness = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Default fusion parameters as a validated [`FusionConfig`]
    pub fn fusion_config(&self) -> Result<FusionConfig> {
        FusionConfig::new(
            self.fusion.method,
            self.fusion.dense_weight,
            self.fusion.sparse_weight,
            self.fusion.rrf_k,
        )
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn cache_io_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.io_timeout_ms)
    }

    pub fn weight_range(&self) -> (f64, f64) {
        (self.optimizer.weight_min, self.optimizer.weight_max)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            RagError::Configuration("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("hybrid-rag").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| RagError::Configuration("Cannot determine data directory".to_string()))?;

        Ok(data_dir.join("hybrid-rag"))
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RagError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::default_data_dir().unwrap_or_else(|_| PathBuf::from(".hybrid-rag"));

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            fusion: FusionSettings {
                method: FusionMethod::Rrf,
                dense_weight: 0.7,
                sparse_weight: 0.3,
                rrf_k: DEFAULT_RRF_K,
            },
            search: SearchSettings {
                timeout_ms: 30_000,
                top_k: 10,
            },
            staging: StagingConfig::default(),
            cache: CacheSettings {
                enabled: true,
                backend: CacheBackendKind::Memory,
                path: data_dir.join("cache.db"),
                ttl_secs: 3600,
                io_timeout_ms: 250,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            sparse: SparseConfig { fuzziness: 0 },
            optimizer: OptimizerConfig {
                weight_min: 0.3,
                weight_max: 0.8,
            },
            evaluation: EvaluationConfig {
                k_values: vec![5, 10, 20],
            },
            profiles: HashMap::new(),
        }
    }
}
