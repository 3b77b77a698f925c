use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SessionStorageError;

/// Simple persisted key-value storage for the session token.
pub trait SessionStorage: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionStorageError>;
    fn remove(&mut self, key: &str) -> Result<(), SessionStorageError>;
}

/// TOML file of string keys, rewritten on every change.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSessionStorage {
    /// Default location under the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roomchat")
            .join("session.toml")
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionStorageError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).map_err(|source| SessionStorageError::Parse {
                path: path.display().to_string(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(SessionStorageError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), SessionStorageError> {
        let io_error = |source| SessionStorageError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let encoded = toml::to_string(&self.values)?;
        fs::write(&self.path, encoded).map_err(io_error)
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionStorageError> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionStorageError> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Volatile storage; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: BTreeMap<String, String>,
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionStorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionStorageError> {
        self.values.remove(key);
        Ok(())
    }
}
