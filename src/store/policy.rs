//! Allow-list documents updated by "always allow" decisions.
//!
//! The document is owned by another program; we only ever append to
//! `permissions.allow` and leave every other key (and its order) as found.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use super::write_atomic;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("malformed policy document {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("i/o error on policy document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyUpdate {
    Added,
    AlreadyPresent,
}

#[derive(Default)]
pub struct PolicyStore {
    // Guards the read-modify-write cycle across concurrent resolves.
    write_lock: Mutex<()>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `pattern` to `permissions.allow` in the document at
    /// `settings_file`, creating the document (and its parent directory)
    /// if needed. A document that cannot be understood is left untouched.
    pub async fn add_allow_pattern(
        &self,
        settings_file: &Path,
        pattern: &str,
    ) -> Result<PolicyUpdate, PolicyError> {
        let _guard = self.write_lock.lock().await;

        let mut document = load_document(settings_file).await?;
        let allow = allow_list_mut(&mut document, settings_file)?;

        if allow.iter().any(|v| v.as_str() == Some(pattern)) {
            return Ok(PolicyUpdate::AlreadyPresent);
        }
        allow.push(Value::String(pattern.to_string()));

        let mut body = serde_json::to_string_pretty(&document).map_err(|e| PolicyError::Io {
            path: settings_file.to_path_buf(),
            source: e.into(),
        })?;
        body.push('\n');

        if let Some(parent) = settings_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PolicyError::Io {
                    path: settings_file.to_path_buf(),
                    source,
                })?;
        }
        write_atomic(settings_file, body.as_bytes())
            .await
            .map_err(|source| PolicyError::Io {
                path: settings_file.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %settings_file.display(), pattern, "added allow pattern");
        Ok(PolicyUpdate::Added)
    }

    /// Current allow patterns in the document, empty if it does not exist.
    pub async fn allow_patterns(&self, settings_file: &Path) -> Result<Vec<String>, PolicyError> {
        let document = load_document(settings_file).await?;
        Ok(document
            .get("permissions")
            .and_then(|p| p.get("allow"))
            .and_then(Value::as_array)
            .map(|allow| {
                allow
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn empty_document() -> Value {
    serde_json::json!({ "permissions": { "allow": [] } })
}

async fn load_document(path: &Path) -> Result<Value, PolicyError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(empty_document()),
        Err(source) => {
            return Err(PolicyError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&raw).map_err(|e| PolicyError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Walk to `permissions.allow`, creating missing levels. Levels that exist
/// with the wrong type are an error rather than something to overwrite.
fn allow_list_mut<'a>(document: &'a mut Value, path: &Path) -> Result<&'a mut Vec<Value>, PolicyError> {
    let malformed = |reason: &str| PolicyError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let root = document
        .as_object_mut()
        .ok_or_else(|| malformed("document is not a JSON object"))?;
    let permissions = root
        .entry("permissions")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed("`permissions` is not an object"))?;
    permissions
        .entry("allow")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| malformed("`permissions.allow` is not an array"))
}
