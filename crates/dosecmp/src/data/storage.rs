//! Reading and writing scene documents and comparison nodes
//!
//! The format follows the file extension: `.json` is JSON, anything else
//! (`.yaml`, `.yml`, no extension) is YAML. Writes go through a temporary
//! file and a rename so an interrupted run never leaves a truncated scene.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::util::io::atomic_write;

/// Error types for storage operations
#[derive(Debug)]
pub enum StorageError {
    Io(String),
    Parse(String),
    Serialize(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "IO error: {}", msg),
            StorageError::Parse(msg) => write!(f, "Parse error: {}", msg),
            StorageError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Load a document, picking the format from the file extension
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let content = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

    match Format::of(path) {
        Format::Json => serde_json::from_str(&content)
            .map_err(|e| StorageError::Parse(format!("Failed to parse {}: {}", path.display(), e))),
        Format::Yaml => serde_saphyr::from_str(&content)
            .map_err(|e| StorageError::Parse(format!("Failed to parse {}: {}", path.display(), e))),
    }
}

/// Save a document atomically, picking the format from the file extension
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let content = match Format::of(path) {
        Format::Json => serde_json::to_string_pretty(value)
            .map_err(|e| StorageError::Serialize(format!("Failed to serialize: {}", e)))?,
        Format::Yaml => serde_saphyr::to_string(value)
            .map_err(|e| StorageError::Serialize(format!("Failed to serialize: {}", e)))?,
    };

    atomic_write(path, &content)
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
}
