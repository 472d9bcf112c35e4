pub mod check;
pub mod up;

use envtest_schema::{parse_config_file, EnvironmentConfig};
use std::path::{Path, PathBuf};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

const DEFAULT_CONFIG: &str = "envtest.toml";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Load the explicit config, else `./envtest.toml` if present, else defaults,
/// then append the extra CRD paths from the command line.
pub fn load_config(config: Option<&Path>, crd_paths: &[PathBuf]) -> Result<EnvironmentConfig, String> {
    let mut loaded = match config {
        Some(path) => parse_config_file(path).map_err(|e| e.to_string())?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            tracing::debug!("using {DEFAULT_CONFIG} from the working directory");
            parse_config_file(DEFAULT_CONFIG).map_err(|e| e.to_string())?
        }
        None => {
            tracing::debug!("no config given, using defaults");
            EnvironmentConfig::default()
        }
    };
    loaded
        .crd_install_options
        .paths
        .extend(crd_paths.iter().cloned());
    Ok(loaded)
}
