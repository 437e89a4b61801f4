//! YAML configuration file support for emgrid.
//!
//! Lets deployments define all stage configurations (store, layout,
//! cluster) in a single YAML file and load them at runtime.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! # emgrid pipeline configuration
//! version: "1.0"
//!
//! store:
//!   max_dim: 20
//!
//! layout:
//!   seed: 0
//!   n_iter: 500
//!   perplexity_cap: 30.0
//!   use_parallel: false
//!
//! cluster:
//!   max_iter: 300
//!   tol: 0.0001
//!   restarts: auto
//! ```

use std::fs;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use emgrid_cluster::{KMeansConfig, Restarts};
use emgrid_layout::{LayoutConfig, ProjectionConfig};
use emgrid_store::StoreConfig;

/// Errors that can occur when loading YAML configuration files.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration for the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmgridConfig {
    /// Configuration format version.
    pub version: String,

    /// Optional configuration name/description.
    #[serde(default)]
    pub name: Option<String>,

    /// Embedding store configuration.
    #[serde(default)]
    pub store: StoreYamlConfig,

    /// Grid layout configuration.
    #[serde(default)]
    pub layout: LayoutYamlConfig,

    /// Clustering configuration.
    #[serde(default)]
    pub cluster: ClusterYamlConfig,
}

impl EmgridConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: EmgridConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.layout.validate()?;
        self.cluster.validate()?;
        Ok(())
    }

    /// Store configuration for vector lookup.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_dim: self.store.max_dim,
        }
    }

    /// Layout configuration for grid assignment.
    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            projection: ProjectionConfig {
                perplexity_cap: self.layout.perplexity_cap,
                n_iter: self.layout.n_iter,
                exaggeration_iters: self.layout.exaggeration_iters,
                exaggeration: self.layout.exaggeration,
                learning_rate: self.layout.learning_rate,
                seed: self.layout.seed,
            },
            use_parallel: self.layout.use_parallel,
        }
    }

    /// Clustering configuration for the given cluster count.
    pub fn kmeans_config(&self, k: usize) -> KMeansConfig {
        KMeansConfig {
            k,
            max_iter: self.cluster.max_iter,
            tol: self.cluster.tol,
            restarts: match self.cluster.restarts {
                RestartsYaml::Auto => Restarts::Auto,
                RestartsYaml::Exact(r) => Restarts::Exact(r),
            },
            seed: self.cluster.seed,
        }
    }
}

impl Default for EmgridConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            store: StoreYamlConfig::default(),
            layout: LayoutYamlConfig::default(),
            cluster: ClusterYamlConfig::default(),
        }
    }
}

/// Embedding store YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    /// Target dimension for reduction; `null` keeps raw embeddings.
    #[serde(default = "default_max_dim")]
    pub max_dim: Option<usize>,
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            max_dim: default_max_dim(),
        }
    }
}

/// Grid layout YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutYamlConfig {
    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_n_iter")]
    pub n_iter: usize,

    #[serde(default = "default_exaggeration_iters")]
    pub exaggeration_iters: usize,

    #[serde(default = "default_exaggeration")]
    pub exaggeration: f64,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_perplexity_cap")]
    pub perplexity_cap: f64,

    #[serde(default)]
    pub use_parallel: bool,
}

impl LayoutYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.n_iter == 0 {
            return Err(ConfigLoadError::Validation(
                "layout.n_iter must be >= 1".to_string(),
            ));
        }
        if self.perplexity_cap <= 0.0 || !self.perplexity_cap.is_finite() {
            return Err(ConfigLoadError::Validation(
                "layout.perplexity_cap must be a finite positive number".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(ConfigLoadError::Validation(
                "layout.learning_rate must be a finite positive number".to_string(),
            ));
        }
        if self.exaggeration < 1.0 || !self.exaggeration.is_finite() {
            return Err(ConfigLoadError::Validation(
                "layout.exaggeration must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LayoutYamlConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            n_iter: default_n_iter(),
            exaggeration_iters: default_exaggeration_iters(),
            exaggeration: default_exaggeration(),
            learning_rate: default_learning_rate(),
            perplexity_cap: default_perplexity_cap(),
            use_parallel: false,
        }
    }
}

/// Restart policy as written in YAML: the literal `auto` or a run count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartsYaml {
    Auto,
    Exact(usize),
}

impl Serialize for RestartsYaml {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RestartsYaml::Auto => serializer.serialize_str("auto"),
            RestartsYaml::Exact(count) => serializer.serialize_u64(*count as u64),
        }
    }
}

impl<'de> Deserialize<'de> for RestartsYaml {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(usize),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(count) => Ok(RestartsYaml::Exact(count)),
            Raw::Word(word) if word == "auto" => Ok(RestartsYaml::Auto),
            Raw::Word(word) => Err(D::Error::custom(format!(
                "expected \"auto\" or a run count, got {word:?}"
            ))),
        }
    }
}

/// Clustering YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterYamlConfig {
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    #[serde(default = "default_tol")]
    pub tol: f64,

    #[serde(default = "default_restarts")]
    pub restarts: RestartsYaml,

    #[serde(default)]
    pub seed: u64,
}

impl ClusterYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_iter == 0 {
            return Err(ConfigLoadError::Validation(
                "cluster.max_iter must be >= 1".to_string(),
            ));
        }
        if self.tol <= 0.0 || !self.tol.is_finite() {
            return Err(ConfigLoadError::Validation(
                "cluster.tol must be a finite positive number".to_string(),
            ));
        }
        if self.restarts == RestartsYaml::Exact(0) {
            return Err(ConfigLoadError::Validation(
                "cluster.restarts must be >= 1 or \"auto\"".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ClusterYamlConfig {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            tol: default_tol(),
            restarts: default_restarts(),
            seed: 0,
        }
    }
}

// Helper functions for serde defaults
fn default_max_dim() -> Option<usize> {
    Some(20)
}
fn default_n_iter() -> usize {
    500
}
fn default_exaggeration_iters() -> usize {
    250
}
fn default_exaggeration() -> f64 {
    12.0
}
fn default_learning_rate() -> f64 {
    200.0
}
fn default_perplexity_cap() -> f64 {
    30.0
}
fn default_max_iter() -> usize {
    300
}
fn default_tol() -> f64 {
    1e-4
}
fn default_restarts() -> RestartsYaml {
    RestartsYaml::Auto
}
