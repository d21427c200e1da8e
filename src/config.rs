//! Configuration for the batch pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Batch source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Artifact output configuration
    pub output: OutputConfig,

    /// Transformation applied to every batch
    #[serde(default)]
    pub transform: TransformConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Run parameters for the synthetic batch source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Number of batches to produce
    #[serde(default = "default_batches")]
    pub batches: u64,

    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Values are drawn uniformly from `[0, value_range)`
    #[serde(default = "default_value_range")]
    pub value_range: f64,

    /// RNG seed for reproducible runs (random when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            batches: default_batches(),
            batch_size: default_batch_size(),
            value_range: default_value_range(),
            seed: None,
        }
    }
}

/// Artifact output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Local filesystem directory for artifacts.
    /// Mutually exclusive with `memory`.
    #[serde(default)]
    pub local_path: Option<String>,

    /// Keep artifacts in an in-memory store (smoke runs and tests).
    #[serde(default)]
    pub memory: bool,

    /// Path prefix for artifacts within the store
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl OutputConfig {
    /// Get the output destination as a display string.
    pub fn path_display(&self) -> String {
        if self.memory {
            format!("memory://{}", self.prefix)
        } else {
            format!(
                "{}/{}",
                self.local_path.as_deref().unwrap_or(""),
                self.prefix
            )
        }
    }
}

/// Transformation selection.
///
/// `scale` multiplies every value by a constant factor. `lookup` resolves a
/// per-group factor through the static factor table, memoized in a bounded
/// cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    Scale {
        #[serde(default = "default_factor")]
        factor: f64,
    },
    Lookup {
        /// Records are grouped by `id % groups` for factor resolution
        #[serde(default = "default_groups")]
        groups: u64,

        /// Factor table keyed by group name (`group_0`, `group_1`, ...)
        #[serde(default)]
        factors: HashMap<String, f64>,

        /// Factor applied to groups missing from the table
        #[serde(default = "default_factor_fallback")]
        default_factor: f64,

        /// Capacity of the factor lookup cache
        #[serde(default = "default_cache_capacity")]
        cache_capacity: usize,
    },
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig::Scale {
            factor: default_factor(),
        }
    }
}

/// Policy applied when the transform fails for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Halt the pipeline, attributing the failure to the batch's index.
    FailFast,

    /// Drop the failing batch with a warning and keep going (documented
    /// data loss; the run outcome is reported as partial).
    Skip,
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Buffer size of the producer → transform channel
    #[serde(default = "default_buffer")]
    pub input_buffer: usize,

    /// Buffer size of the transform → persist channel
    #[serde(default = "default_buffer")]
    pub output_buffer: usize,

    /// Policy for transform failures
    #[serde(default = "default_error_policy")]
    pub on_transform_error: ErrorPolicy,

    /// Number of tokio worker threads (null = num CPUs)
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Rayon thread pool size for CPU-bound record transforms (null = num CPUs)
    #[serde(default)]
    pub rayon_threads: Option<usize>,

    /// Enable progress reporting
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after the run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            input_buffer: default_buffer(),
            output_buffer: default_buffer(),
            on_transform_error: default_error_policy(),
            worker_threads: None,
            rayon_threads: None,
            enable_metrics: true,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from the file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // YAML is a superset of JSON
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.output.local_path, self.output.memory) {
            (Some(_), true) => {
                anyhow::bail!("Cannot specify both local_path and memory output");
            }
            (None, false) => {
                anyhow::bail!("Must specify either local_path or memory output");
            }
            _ => {}
        }

        if self.source.batch_size == 0 {
            anyhow::bail!("Batch size must be > 0");
        }
        if self.source.value_range <= 0.0 {
            anyhow::bail!("Value range must be > 0");
        }
        if self.processing.input_buffer == 0 || self.processing.output_buffer == 0 {
            anyhow::bail!("Channel buffers must be > 0");
        }
        if self.processing.enable_metrics && self.processing.metrics_interval_secs == 0 {
            anyhow::bail!("Metrics interval must be > 0");
        }

        match &self.transform {
            TransformConfig::Scale { factor } => {
                if !factor.is_finite() {
                    anyhow::bail!("Scale factor must be finite");
                }
            }
            TransformConfig::Lookup {
                groups,
                factors,
                default_factor,
                cache_capacity,
            } => {
                if *groups == 0 {
                    anyhow::bail!("Lookup groups must be > 0");
                }
                if *cache_capacity == 0 {
                    anyhow::bail!("Lookup cache capacity must be > 0");
                }
                if !default_factor.is_finite() {
                    anyhow::bail!("Default factor must be finite");
                }
                if let Some((key, _)) = factors.iter().find(|(_, f)| !f.is_finite()) {
                    anyhow::bail!("Factor for {} must be finite", key);
                }
            }
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_batches() -> u64 {
    5
}
fn default_batch_size() -> usize {
    20_000
}
fn default_value_range() -> f64 {
    100.0
}
fn default_prefix() -> String {
    "batches".to_string()
}
fn default_factor() -> f64 {
    2.0
}
fn default_groups() -> u64 {
    10
}
fn default_factor_fallback() -> f64 {
    1.0
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_buffer() -> usize {
    4
}
fn default_error_policy() -> ErrorPolicy {
    ErrorPolicy::FailFast
}
fn default_true() -> bool {
    true
}
fn default_metrics_interval() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        Config {
            source: SourceConfig::default(),
            output: OutputConfig {
                local_path: None,
                memory: true,
                prefix: default_prefix(),
            },
            transform: TransformConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }

    #[test]
    fn test_source_defaults() {
        let source = SourceConfig::default();
        assert_eq!(source.batches, 5);
        assert_eq!(source.batch_size, 20_000);
        assert_eq!(source.value_range, 100.0);
        assert!(source.seed.is_none());
    }

    #[test]
    fn test_config_validation_memory() {
        assert!(memory_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_local() {
        let mut config = memory_config();
        config.output.memory = false;
        config.output.local_path = Some("/tmp/batchflow-out".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_no_destination() {
        let mut config = memory_config();
        config.output.memory = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_both_destinations() {
        let mut config = memory_config();
        config.output.local_path = Some("/tmp/out".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_batch_size() {
        let mut config = memory_config();
        config.source.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_nonfinite_factor() {
        let mut config = memory_config();
        config.transform = TransformConfig::Scale {
            factor: f64::INFINITY,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batches_is_valid() {
        let mut config = memory_config();
        config.source.batches = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
source:
  batches: 3
  batch_size: 100
  seed: 42
output:
  memory: true
transform:
  kind: scale
  factor: 3.0
processing:
  on_transform_error: skip
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.batches, 3);
        assert_eq!(config.source.seed, Some(42));
        assert!(matches!(
            config.transform,
            TransformConfig::Scale { factor } if factor == 3.0
        ));
        assert_eq!(config.processing.on_transform_error, ErrorPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_lookup_transform() {
        let yaml = r#"
output:
  memory: true
transform:
  kind: lookup
  groups: 4
  factors:
    group_0: 1.5
    group_1: 2.5
  default_factor: 1.0
"#;
        let config = Config::from_yaml(yaml).unwrap();
        match &config.transform {
            TransformConfig::Lookup {
                groups, factors, ..
            } => {
                assert_eq!(*groups, 4);
                assert_eq!(factors.get("group_0"), Some(&1.5));
            }
            other => panic!("expected lookup transform, got {:?}", other),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = memory_config();
        let yaml = config.to_yaml().unwrap();
        let back = Config::from_yaml(&yaml).unwrap();
        assert_eq!(back.source.batches, config.source.batches);
        assert_eq!(back.output.prefix, config.output.prefix);
    }

    #[test]
    fn test_path_display() {
        let mut config = memory_config();
        assert_eq!(config.output.path_display(), "memory://batches");

        config.output.memory = false;
        config.output.local_path = Some("/data/out".to_string());
        assert_eq!(config.output.path_display(), "/data/out/batches");
    }
}
