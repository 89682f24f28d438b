//! Settings loading.
//!
//! Settings come from two places:
//! - **Store**: the per-user `confy` file under the `sensordash` app name
//! - **File**: an explicit TOML path, used by the replay CLI and tests
//!
//! Missing keys fall back to `DashboardSettings::default()`.

use std::fs;
use std::path::Path;

use sensordash_types::DashboardSettings;

use crate::error::ConfigError;

/// App name used for the per-user settings store.
pub const APP_NAME: &str = "sensordash";

/// Load settings from the per-user store, creating it with defaults on first run.
pub fn load_settings() -> Result<DashboardSettings, ConfigError> {
    let path = confy::get_configuration_file_path(APP_NAME, None)?;
    load_settings_store(&path)
}

/// Load settings from a `confy` store at `path`, writing defaults if it is missing.
pub fn load_settings_store(path: &Path) -> Result<DashboardSettings, ConfigError> {
    let settings: DashboardSettings = confy::load_path(path)?;
    tracing::debug!(
        path = %path.display(),
        timeout_secs = settings.query_timeout_secs,
        range = %settings.default_time_range,
        "Loaded dashboard settings"
    );
    Ok(settings)
}

/// Load settings from a TOML file.
pub fn load_settings_file(path: &Path) -> Result<DashboardSettings, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
