use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Create request for one environment.
///
/// Binary asset settings are passed through to the runtime untouched; the
/// CRD install options are decoded before the runtime is started.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub binary_assets_settings: BinaryAssetsSettings,
    #[serde(default)]
    pub crd_install_options: CrdInstallOptions,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BinaryAssetsSettings {
    #[serde(default)]
    pub binary_assets_directory: Option<PathBuf>,
    #[serde(default)]
    pub download_binary_assets_version: Option<String>,
    #[serde(default)]
    pub download_binary_assets_index_url: Option<String>,
    #[serde(default)]
    pub download_binary_assets: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CrdInstallOptions {
    /// Raw CRD documents, installed in order.
    #[serde(default)]
    pub crds: Vec<String>,
    /// Files or directories holding additional CRD documents.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub error_if_path_missing: bool,
}

impl EnvironmentConfig {
    #[must_use]
    pub fn with_crd(mut self, document: impl Into<String>) -> Self {
        self.crd_install_options.crds.push(document.into());
        self
    }

    #[must_use]
    pub fn with_crd_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.crd_install_options.paths.push(path.into());
        self
    }
}

pub fn parse_config_str(input: &str) -> Result<EnvironmentConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<EnvironmentConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
