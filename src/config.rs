//! TOML-backed runtime configuration with environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_COLLECTION: &str = "messages";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;
const DEFAULT_REFRESH_DEBOUNCE_MS: u64 = 1_000;
const DEFAULT_MAX_ROOM_NAME_LEN: usize = 30;
const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    /// Firebase project; without one the client runs against the in-memory store.
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    pub collection: String,
    pub poll_interval_ms: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub refresh_debounce_ms: u64,
    pub max_name_len: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            refresh_debounce_ms: DEFAULT_REFRESH_DEBOUNCE_MS,
            max_name_len: DEFAULT_MAX_ROOM_NAME_LEN,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub firestore: FirestoreConfig,
    pub rooms: RoomsConfig,
    pub session: SessionConfig,
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roomchat")
            .join("config.toml")
    }

    /// Load `path` (missing file means defaults), then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw, path)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_overrides<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(project_id) = optional_trimmed_env("ROOMCHAT_PROJECT_ID", &mut lookup) {
            self.firestore.project_id = Some(project_id);
        }
        if let Some(api_key) = optional_trimmed_env("ROOMCHAT_API_KEY", &mut lookup) {
            self.firestore.api_key = Some(api_key);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.firestore.collection.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "firestore.collection",
                value: self.firestore.collection.clone(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.firestore.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                key: "firestore.poll_interval_ms",
                value: self.firestore.poll_interval_ms.to_string(),
                reason: format!("must be at least {}", MIN_POLL_INTERVAL_MS),
            });
        }
        if self.rooms.max_name_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rooms.max_name_len",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.firestore.poll_interval_ms)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.rooms.refresh_debounce_ms)
    }
}

fn optional_trimmed_env<F>(key: &str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
