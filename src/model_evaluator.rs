//! # Cost Model Evaluator
//!
//! Loads per-syscall cost models from a TOML document and evaluates them for
//! a given size parameter. The document maps a model kind to a table of
//! syscall names, each with the coefficients of a polynomial in the size
//! parameter (constant term first):
//!
//! ```toml
//! [TimeModel]
//! "stoffel_share::add_uint32_vec" = [2.0, 0.5]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use smallvec::SmallVec;
use thiserror::Error;

/// Model kind consulted by the dispatch layer when profiling
pub const TIME_MODEL: &str = "TimeModel";

#[derive(Debug, Error)]
pub enum ModelEvaluatorError {
    #[error("failed to read model evaluator configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model evaluator configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("model {kind}/{name} has no coefficients")]
    InvalidModel { kind: String, name: String },
}

/// Polynomial cost model
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    coefficients: SmallVec<[f64; 4]>,
}

impl Model {
    pub fn new(coefficients: &[f64]) -> Self {
        Model {
            coefficients: SmallVec::from_slice(coefficients),
        }
    }

    /// Value of the polynomial at `parameter`
    pub fn evaluate(&self, parameter: u64) -> f64 {
        let x = parameter as f64;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * x + c)
    }
}

#[derive(Deserialize)]
#[serde(transparent)]
struct RawModels(FxHashMap<String, FxHashMap<String, Vec<f64>>>);

/// Lookup table of cost models by kind and syscall name
#[derive(Debug, Default)]
pub struct CostModelEvaluator {
    models: FxHashMap<String, FxHashMap<String, Model>>,
}

impl CostModelEvaluator {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ModelEvaluatorError> {
        let contents = fs::read_to_string(path).map_err(|source| ModelEvaluatorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Parse a model document; `origin` is only used in error messages
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ModelEvaluatorError> {
        let RawModels(raw) = toml::from_str(contents).map_err(|source| ModelEvaluatorError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut models = FxHashMap::default();
        for (kind, entries) in raw {
            let mut table = FxHashMap::default();
            for (name, coefficients) in entries {
                if coefficients.is_empty() {
                    return Err(ModelEvaluatorError::InvalidModel { kind, name });
                }
                table.insert(name, Model::new(&coefficients));
            }
            models.insert(kind, table);
        }
        Ok(CostModelEvaluator { models })
    }

    pub fn model(&self, kind: &str, name: &str) -> Option<&Model> {
        self.models.get(kind)?.get(name)
    }

    /// Number of models of the given kind
    pub fn model_count(&self, kind: &str) -> usize {
        self.models.get(kind).map_or(0, |table| table.len())
    }
}
