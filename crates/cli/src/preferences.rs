//! Local preference persistence.
//!
//! A flat JSON object on disk. Every key is stored with the
//! [`KEY_PREFIX`] namespace so the file can be shared with other tools.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Namespace prepended to every stored key.
pub const KEY_PREFIX: &str = "tellmemo.";

pub const PREF_TASK_SORT: &str = "tasks.sort";
pub const PREF_TASK_SORT_DIRECTION: &str = "tasks.sort_direction";
pub const PREF_TASK_GROUP: &str = "tasks.group_by";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("Preference file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preference file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key/value preferences backed by a JSON file.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    values: BTreeMap<String, serde_json::Value>,
}

impl PreferenceStore {
    /// Load the store at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferenceError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value. Values that no longer decode as `T` read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = full_key(key);
        let value = self.values.get(&full_key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "Ignoring undecodable preference");
                None
            }
        }
    }

    /// Store a value and write the file.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), PreferenceError> {
        self.values.insert(full_key(key), serde_json::to_value(value)?);
        self.save()
    }

    /// Remove a value. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool, PreferenceError> {
        let existed = self.values.remove(&full_key(key)).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// Stored keys without the namespace prefix.
    pub fn keys(&self) -> Vec<&str> {
        self.values
            .keys()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX))
            .collect()
    }

    fn save(&self) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, text)?;
        tracing::debug!(path = %self.path.display(), "Saved preferences");
        Ok(())
    }
}

fn full_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tellmemo_core::tasks::TaskSortKey;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::open(dir.path().join("prefs.json")).unwrap();
        assert!(store.keys().is_empty());
        assert_eq!(store.get::<String>("anything"), None);
    }

    #[test]
    fn values_persist_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/prefs.json");

        let mut store = PreferenceStore::open(&path).unwrap();
        store.set(PREF_TASK_SORT, &TaskSortKey::Priority).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["tellmemo.tasks.sort"], "priority");

        let reopened = PreferenceStore::open(&path).unwrap();
        assert_eq!(reopened.get::<TaskSortKey>(PREF_TASK_SORT), Some(TaskSortKey::Priority));
        assert_eq!(reopened.keys(), vec![PREF_TASK_SORT]);
    }

    #[test]
    fn remove_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PreferenceStore::open(dir.path().join("p.json")).unwrap();
        store.set("view_mode", &"grid").unwrap();
        assert!(store.remove("view_mode").unwrap());
        assert!(!store.remove("view_mode").unwrap());
    }

    #[test]
    fn undecodable_value_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PreferenceStore::open(dir.path().join("p.json")).unwrap();
        store.set(PREF_TASK_SORT, &"sideways").unwrap();
        assert_eq!(store.get::<TaskSortKey>(PREF_TASK_SORT), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(PreferenceStore::open(&path), Err(PreferenceError::Json(_)));
    }
}
