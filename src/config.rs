use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const API_BASE_URL_ENV: &str = "CLOUDIVERSE_API_BASE_URL";
pub const LEGACY_API_BASE_URL_ENV: &str = "VITE_API_BASE_URL";
pub const TOKEN_ENV: &str = "CLOUDIVERSE_TOKEN";

const SETTINGS_FILE: &str = "settings.json";

/// Persisted client settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,

    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(skip)]
    env: EnvOverrides,
}

/// Values taken from the environment. They are never written back to disk.
#[derive(Debug, Clone, Default, PartialEq)]
struct EnvOverrides {
    api_base_url: Option<String>,
    token: Option<String>,
}

impl Settings {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let project_dirs =
            ProjectDirs::from("", "", "cloudiverse").ok_or(ConfigError::NoConfigDir)?;
        Ok(project_dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Loads the settings file from the platform config directory and applies
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Self::load_from(&Self::default_path()?)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Reads `path`. A missing file yields default settings bound to `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = match fs::read_to_string(path) {
            Ok(contents) => {
                serde_json::from_str::<Settings>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path.display().to_string(),
                        source,
                    }
                })?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(path:% = path.display(); "no settings file, using defaults");
                Settings::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        settings.path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Environment values win over the file when resolving, but `save` only
    /// writes the file values. `lookup` is usually `std::env::var`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        self.env = EnvOverrides {
            api_base_url: non_empty(API_BASE_URL_ENV).or_else(|| non_empty(LEGACY_API_BASE_URL_ENV)),
            token: non_empty(TOKEN_ENV),
        };
    }

    /// Resolved base URL: environment, then file, then the default.
    pub fn api_base_url(&self) -> &str {
        self.env
            .api_base_url
            .as_deref()
            .or(self.api_base_url.as_deref())
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
    }

    /// Resolved session token: environment first, then file.
    pub fn token(&self) -> Option<&str> {
        self.env.token.as_deref().or(self.token.as_deref())
    }

    /// True when `CLOUDIVERSE_TOKEN` shadows whatever token the file holds.
    pub fn token_from_env(&self) -> bool {
        self.env.token.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => Self::default_path()?,
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, contents).map_err(io_error)?;

        log::debug!(path:% = path.display(); "saved settings");
        Ok(())
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }
}
