use crate::config::{CacheBackendKind, Config, SCHEMA_VERSION};
use crate::embedding::MAX_FUZZINESS;
use crate::error::{RagError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every error
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate fusion defaults
        Self::validate_fusion(config, &mut errors);

        // Validate search and staging settings
        Self::validate_search(config, &mut errors);

        // Validate cache settings
        Self::validate_cache(config, &mut errors);

        // Validate retriever settings
        Self::validate_retrievers(config, &mut errors);

        // Validate evaluation and optimizer settings
        Self::validate_evaluation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        for (path, weight) in [
            ("fusion.dense_weight", config.fusion.dense_weight),
            ("fusion.sparse_weight", config.fusion.sparse_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be between 0.0 and 1.0, got {}", weight),
                ));
            }
        }

        if config.fusion.rrf_k == 0 {
            errors.push(ValidationError::new(
                "fusion.rrf_k",
                "RRF constant must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.search.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "search.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if config.search.top_k == 0 {
            errors.push(ValidationError::new(
                "search.top_k",
                "top_k must be greater than 0",
            ));
        }

        if let Err(e) = config.staging.validate() {
            errors.push(ValidationError::new("staging", e.to_string()));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.ttl_secs == 0 {
            errors.push(ValidationError::new(
                "cache.ttl_secs",
                "TTL must be greater than 0",
            ));
        }

        if config.cache.io_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "cache.io_timeout_ms",
                "I/O timeout must be greater than 0",
            ));
        }

        if config.cache.backend == CacheBackendKind::Sqlite
            && config.cache.path.as_os_str().is_empty()
        {
            errors.push(ValidationError::new(
                "cache.path",
                "SQLite cache path cannot be empty",
            ));
        }
    }

    fn validate_retrievers(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.sparse.fuzziness > MAX_FUZZINESS {
            errors.push(ValidationError::new(
                "sparse.fuzziness",
                format!(
                    "Fuzziness must be between 0 and {}, got {}",
                    MAX_FUZZINESS, config.sparse.fuzziness
                ),
            ));
        }
    }

    fn validate_evaluation(config: &Config, errors: &mut Vec<ValidationError>) {
        let (min, max) = config.weight_range();
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min >= max {
            errors.push(ValidationError::new(
                "optimizer",
                format!(
                    "Weight range must satisfy 0 <= weight_min < weight_max <= 1, got ({}, {})",
                    min, max
                ),
            ));
        }

        let k_values = &config.evaluation.k_values;
        if k_values.is_empty() || k_values.contains(&0) {
            errors.push(ValidationError::new(
                "evaluation.k_values",
                "k_values must be non-empty and every k greater than 0",
            ));
        }
    }
}
