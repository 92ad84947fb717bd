//! Configuration loading via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Pipeline configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "CHANGECAST")]
pub struct PipelineConfig {
    /// Base URL of the remote compute platform's REST surface.
    pub compute_base_url: String,
    /// Bearer token for the compute platform. Required.
    pub compute_token: String,
    /// Base URL of the remote object store's REST surface.
    pub store_base_url: String,
    /// Bearer token for the object store. Required.
    pub store_token: String,
    /// Long-term storage bucket receiving published outputs.
    pub bucket: String,
    /// Local staging directory for retrieved artifacts.
    pub staging_dir: Utf8PathBuf,
    /// Local directory holding finished mosaics awaiting upload.
    pub publish_dir: Utf8PathBuf,
    /// Seconds between completion polls. Remote exports take minutes to
    /// hours; tight polling wastes quota. Defaults to 300.
    #[ortho_config(default = 300)]
    pub poll_interval_secs: u64,
    /// Wall-clock budget in seconds before an unsettled batch fails with a
    /// diagnostic. Defaults to 12 hours.
    #[ortho_config(default = 43_200)]
    pub wait_budget_secs: u64,
    /// Bounded retry attempts applied to remote listing calls.
    #[ortho_config(default = 3)]
    pub list_retry_attempts: u32,
    /// Object-storage CLI binary used for publishing.
    #[ortho_config(default = "aws".to_owned())]
    pub aws_bin: String,
    /// GDAL warp binary used for mosaicking.
    #[ortho_config(default = "gdalwarp".to_owned())]
    pub gdalwarp_bin: String,
    /// GDAL translate binary used for GeoTIFF packaging.
    #[ortho_config(default = "gdal_translate".to_owned())]
    pub gdal_translate_bin: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl PipelineConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to changecast.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags
    /// in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("changecast")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages
    /// include guidance on how to provide missing values via environment
    /// variables or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when a numeric field is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.compute_base_url,
            &FieldMetadata::new(
                "compute platform URL",
                "CHANGECAST_COMPUTE_BASE_URL",
                "compute_base_url",
            ),
        )?;
        Self::require_field(
            &self.compute_token,
            &FieldMetadata::new(
                "compute platform token",
                "CHANGECAST_COMPUTE_TOKEN",
                "compute_token",
            ),
        )?;
        Self::require_field(
            &self.store_base_url,
            &FieldMetadata::new(
                "object store URL",
                "CHANGECAST_STORE_BASE_URL",
                "store_base_url",
            ),
        )?;
        Self::require_field(
            &self.store_token,
            &FieldMetadata::new("object store token", "CHANGECAST_STORE_TOKEN", "store_token"),
        )?;
        Self::require_field(
            &self.bucket,
            &FieldMetadata::new("publish bucket", "CHANGECAST_BUCKET", "bucket"),
        )?;
        Self::require_field(
            self.staging_dir.as_str(),
            &FieldMetadata::new("staging directory", "CHANGECAST_STAGING_DIR", "staging_dir"),
        )?;
        Self::require_field(
            self.publish_dir.as_str(),
            &FieldMetadata::new("publish directory", "CHANGECAST_PUBLISH_DIR", "publish_dir"),
        )?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "poll_interval_secs must be greater than zero",
            )));
        }
        if self.wait_budget_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "wait_budget_secs must be greater than zero",
            )));
        }
        if self.list_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "list_retry_attempts must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a numeric field holds a value outside its valid range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
