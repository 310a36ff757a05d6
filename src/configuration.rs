//! # Protection Domain Configuration
//!
//! A protection domain is configured by a small TOML document naming the
//! cost-model file its PDPIs evaluate:
//!
//! ```toml
//! [ProtectionDomain]
//! ModelEvaluatorConfiguration = "models.toml"
//! ```
//!
//! Relative model paths are resolved against the directory holding the
//! configuration file itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model_evaluator::{CostModelEvaluator, ModelEvaluatorError};

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("ProtectionDomain.ModelEvaluatorConfiguration is empty")]
    EmptyModelEvaluatorConfiguration,
    #[error(transparent)]
    ModelEvaluator(#[from] ModelEvaluatorError),
}

#[derive(Deserialize)]
struct RawConfiguration {
    #[serde(rename = "ProtectionDomain")]
    protection_domain: RawProtectionDomain,
}

#[derive(Deserialize)]
struct RawProtectionDomain {
    #[serde(rename = "ModelEvaluatorConfiguration")]
    model_evaluator_configuration: String,
}

/// Parsed protection domain configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdConfiguration {
    model_evaluator_configuration: PathBuf,
}

impl PdConfiguration {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml_str(&contents, base_dir).map_err(|e| match e {
            ConfigurationError::Parse { source, .. } => ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse a configuration document, resolving relative paths against `base_dir`
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> Result<Self, ConfigurationError> {
        let raw: RawConfiguration = toml::from_str(contents).map_err(|source| ConfigurationError::Parse {
            path: base_dir.to_path_buf(),
            source,
        })?;

        let configured = raw.protection_domain.model_evaluator_configuration;
        if configured.trim().is_empty() {
            return Err(ConfigurationError::EmptyModelEvaluatorConfiguration);
        }

        let configured = PathBuf::from(configured);
        let model_evaluator_configuration = if configured.is_absolute() {
            configured
        } else {
            base_dir.join(configured)
        };
        Ok(PdConfiguration {
            model_evaluator_configuration,
        })
    }

    pub fn model_evaluator_configuration(&self) -> &Path {
        &self.model_evaluator_configuration
    }

    /// Load the cost models this configuration points at
    pub fn load_model_evaluator(&self) -> Result<CostModelEvaluator, ConfigurationError> {
        Ok(CostModelEvaluator::load(&self.model_evaluator_configuration)?)
    }
}
