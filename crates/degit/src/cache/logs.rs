//! Per-repository cache logs
//!
//! Each repository directory carries two small JSON maps keyed by the ref
//! string the user asked for:
//!
//! - `access.json`: ref → last time it was used (RFC 3339, UTC)
//! - `map.json`: ref → commit hash it last resolved to
//!
//! Both are read in full, merged and rewritten through a temporary file that
//! is renamed over the existing file.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the access log
pub const ACCESS_LOG_NAME: &str = "access.json";

/// File name of the ref → hash map
pub const HASH_LOG_NAME: &str = "map.json";

/// Errors that can occur reading or writing a log
#[derive(Debug, Error)]
pub enum LogError {
    /// IO error
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("malformed log {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A JSON object persisted as one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLog<V> {
    path: PathBuf,
    entries: BTreeMap<String, V>,
}

/// Ref → last access timestamp
pub type AccessLog = JsonLog<DateTime<Utc>>;

/// Ref → last resolved commit hash
pub type HashLog = JsonLog<String>;

impl<V> JsonLog<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Load a log, treating a missing or empty file as an empty log
    pub fn load(path: &Path) -> Result<Self, LogError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(LogError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let entries = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents).map_err(|source| LogError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Look up a ref
    pub fn get(&self, reference: &str) -> Option<&V> {
        self.entries.get(reference)
    }

    /// Set a ref, returning the previous value
    pub fn insert(&mut self, reference: &str, value: V) -> Option<V> {
        self.entries.insert(reference.to_string(), value)
    }

    /// Number of refs recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over recorded refs in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    /// Write the log back to its file
    pub fn save(&self) -> Result<(), LogError> {
        let io_err = |source| LogError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_vec_pretty(&self.entries).map_err(|source| LogError::Json {
            path: self.path.clone(),
            source,
        })?;

        fs::create_dir_all(dir).map_err(io_err)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        temp.write_all(&json).map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;

        Ok(())
    }
}
