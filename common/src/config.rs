use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Root holding the `song_data/` and `log_data/` document trees.
    pub input_data: String,
    /// Root under which the five `*_table/` directories are written.
    pub output_data: String,
    #[serde(default = "default_song_data_prefix")]
    pub song_data_prefix: String,
    #[serde(default = "default_log_data_prefix")]
    pub log_data_prefix: String,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Object store credentials. Absent for local filesystem runs.
    pub storage: Option<StorageConfig>,
}

/// What to do when a table's target path already holds objects.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    ErrorIfExists,
    Overwrite,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    pub target_partitions: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Custom S3 endpoint (MinIO, localstack). AWS is used when unset.
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub allow_http: bool,
}

fn default_song_data_prefix() -> String {
    "song_data/".to_string()
}

fn default_log_data_prefix() -> String {
    "log_data/".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("DATALAKE")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Build the configuration
        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            input_data = %settings.input_data,
            output_data = %settings.output_data,
            write_mode = ?settings.write_mode,
            remote_storage = settings.storage.is_some(),
            "Loaded data lake settings"
        );

        Ok(settings)
    }

    /// Settings for a local run over the given roots, everything else defaulted.
    pub fn with_roots(input_data: &str, output_data: &str) -> Self {
        Self {
            input_data: input_data.to_string(),
            output_data: output_data.to_string(),
            song_data_prefix: default_song_data_prefix(),
            log_data_prefix: default_log_data_prefix(),
            write_mode: WriteMode::default(),
            engine: EngineConfig::default(),
            storage: None,
        }
    }

    pub fn song_data_path(&self) -> String {
        join_prefix(&self.input_data, &self.song_data_prefix)
    }

    pub fn log_data_path(&self) -> String {
        join_prefix(&self.input_data, &self.log_data_prefix)
    }
}

/// Joins a root and a sub-prefix, always yielding a trailing `/` so the
/// result is treated as a directory.
pub fn join_prefix(root: &str, prefix: &str) -> String {
    let root = root.trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/", root)
    } else {
        format!("{}/{}/", root, prefix)
    }
}
