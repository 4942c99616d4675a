//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, EmbeddingProviderKind};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_storage(config, &mut result);
        Self::validate_embedding(config, &mut result);
        Self::validate_search(config, &mut result);
        Self::validate_prune(config, &mut result);

        result
    }

    fn validate_storage(config: &Config, result: &mut ValidationResult) {
        if config.storage.path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "storage.path",
                "Storage path cannot be empty",
            ));
        }

        if !config.storage.vector_index {
            result.add_warning(ValidationWarning::new(
                "storage.vector_index",
                "Vector index disabled, searches will be lexical only",
            ));
        }
    }

    fn validate_embedding(config: &Config, result: &mut ValidationResult) {
        let embedding = &config.embedding;

        if embedding.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "embedding.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        match embedding.provider {
            EmbeddingProviderKind::Openai => {
                if embedding.openai.api_key.is_none() {
                    result.add_error(ValidationError::new(
                        "embedding.openai.api_key",
                        "API key is required for the openai provider",
                    ));
                }

                let url = &embedding.openai.base_url;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    result.add_error(ValidationError::new(
                        "embedding.openai.base_url",
                        "base_url must start with http:// or https://",
                    ));
                }
            }
            EmbeddingProviderKind::Hash => {
                result.add_warning(ValidationWarning::new(
                    "embedding.provider",
                    "Hash embeddings are lexical in nature, semantic recall will be weak",
                ));
            }
            EmbeddingProviderKind::Local | EmbeddingProviderKind::None => {}
        }
    }

    fn validate_search(config: &Config, result: &mut ValidationResult) {
        let weight = config.search.vector_weight;
        if !(0.0..=1.0).contains(&weight) {
            result.add_error(ValidationError::new(
                "search.vector_weight",
                format!("vector_weight must be between 0 and 1, got {}", weight),
            ));
        }

        if config.search.rrf_k <= 0.0 || !config.search.rrf_k.is_finite() {
            result.add_error(ValidationError::new(
                "search.rrf_k",
                "rrf_k must be a positive number",
            ));
        }

        if config.search.default_limit == 0 {
            result.add_error(ValidationError::new(
                "search.default_limit",
                "default_limit must be greater than 0",
            ));
        }
    }

    fn validate_prune(config: &Config, result: &mut ValidationResult) {
        let ceiling = config.prune.importance_below;
        if !(0.0..=1.0).contains(&ceiling) {
            result.add_error(ValidationError::new(
                "prune.importance_below",
                format!("importance_below must be between 0 and 1, got {}", ceiling),
            ));
        }

        if config.prune.older_than_days == 0 {
            result.add_warning(ValidationWarning::new(
                "prune.older_than_days",
                "older_than_days is 0, every low-importance memory is eligible for pruning",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
