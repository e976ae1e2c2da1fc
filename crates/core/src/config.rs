use crate::types::{ExperimentDefinition, FeatureFlagDefinition};
use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from an optional catalog file
/// (TOML or JSON) and environment variables with the prefix `SPLITSITE__`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub experiments: Vec<ExperimentDefinition>,
    #[serde(default)]
    pub flags: Vec<FeatureFlagDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// File backing the persistent key-value store.
    #[serde(default = "default_storage_path")]
    pub path: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub assignment_scope: AssignmentScope,
}

/// Which inputs select the storage slot of a computed assignment.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentScope {
    /// One slot per `(experiment, visitor)`.
    #[default]
    Visitor,
    /// One slot per `(experiment, bucket)`; visitors sharing a bucket share
    /// the slot. Matches stores written by the previous site.
    Bucket,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// JSON-lines file the batch writer appends events to.
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

// Default functions
fn default_storage_path() -> String {
    "splitsite-store.json".to_string()
}
fn default_key_prefix() -> String {
    "splitsite".to_string()
}
fn default_output_path() -> String {
    "splitsite-events.jsonl".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    10_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            key_prefix: default_key_prefix(),
            assignment_scope: AssignmentScope::default(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional catalog file and the environment.
    /// Environment variables win over the file.
    pub fn load(catalog: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = catalog {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("SPLITSITE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
