//! Durable numeric-id to display-name mapping.
//!
//! Stored as a JSON object (`{"0": "None", "1": "Alice", ...}`) and rewritten
//! in full after every mutation. Id `"0"` is the recognizer's background
//! class and always maps to [`BACKGROUND_NAME`].

use crate::ledger::write_atomic;
use crate::types::RESERVED_ID;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sentinel name stored under the reserved id.
pub const BACKGROUND_NAME: &str = "None";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("identity {0} not found")]
    NotFound(String),
    #[error("identity {id} is already registered as {existing:?}, refusing to rename to {requested:?}")]
    Conflict {
        id: String,
        existing: String,
        requested: String,
    },
    #[error("identity id 0 is reserved for the background class")]
    Reserved,
    #[error("invalid identity id {0:?}: expected a non-negative integer")]
    InvalidId(String),
    #[error("invalid display name {0:?}")]
    InvalidName(String),
    #[error("directory storage error: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("directory file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of a successful [`IdentityDirectory::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// The id already mapped to the same name.
    Unchanged,
}

#[derive(Debug)]
pub struct IdentityDirectory {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl IdentityDirectory {
    /// Load the directory, or start an empty one if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
        let path = path.into();
        let mut entries: BTreeMap<String, String> = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        match entries.get(RESERVED_ID) {
            Some(name) if name == BACKGROUND_NAME => {}
            Some(name) => {
                tracing::warn!(
                    path = %path.display(),
                    found = %name,
                    "reserved id remapped to background sentinel"
                );
                entries.insert(RESERVED_ID.to_string(), BACKGROUND_NAME.to_string());
            }
            None => {
                entries.insert(RESERVED_ID.to_string(), BACKGROUND_NAME.to_string());
            }
        }

        tracing::debug!(path = %path.display(), identities = entries.len() - 1, "directory loaded");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map `id` to `name`. Re-registering the same pair is a no-op; a
    /// different name for an existing id is a conflict.
    pub fn register(&mut self, id: &str, name: &str) -> Result<Registration, DirectoryError> {
        let id = validate_id(id)?;
        let name = name.trim();
        if name.is_empty() || name.contains([',', '\n', '\r']) {
            return Err(DirectoryError::InvalidName(name.to_string()));
        }

        if let Some(existing) = self.entries.get(id) {
            if existing == name {
                return Ok(Registration::Unchanged);
            }
            return Err(DirectoryError::Conflict {
                id: id.to_string(),
                existing: existing.clone(),
                requested: name.to_string(),
            });
        }

        self.entries.insert(id.to_string(), name.to_string());
        if let Err(e) = self.persist() {
            self.entries.remove(id);
            return Err(e);
        }
        tracing::info!(id, name, "identity registered");
        Ok(Registration::Added)
    }

    pub fn resolve(&self, id: &str) -> Result<&str, DirectoryError> {
        self.entries
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    /// Remove an identity. Past ledger events are not affected.
    pub fn unregister(&mut self, id: &str) -> Result<String, DirectoryError> {
        if id == RESERVED_ID {
            return Err(DirectoryError::Reserved);
        }
        let name = self
            .entries
            .remove(id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        if let Err(e) = self.persist() {
            self.entries.insert(id.to_string(), name);
            return Err(e);
        }
        tracing::info!(id, name = %name, "identity removed");
        Ok(name)
    }

    /// Enrolled identities in id order, excluding the background class.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(id, _)| id.as_str() != RESERVED_ID)
            .map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Number of enrolled identities, excluding the background class.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<(), DirectoryError> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

fn validate_id(id: &str) -> Result<&str, DirectoryError> {
    let id = id.trim();
    if id == RESERVED_ID {
        return Err(DirectoryError::Reserved);
    }
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DirectoryError::InvalidId(id.to_string()));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("rollcall-directory-{}", Uuid::new_v4()))
            .join("id_to_name_map.json")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_register_conflict() {
        let path = temp_path();
        let mut dir = IdentityDirectory::load(&path).unwrap();

        assert_eq!(dir.register("7", "Alice").unwrap(), Registration::Added);
        assert_eq!(dir.register("7", "Alice").unwrap(), Registration::Unchanged);
        match dir.register("7", "Bob") {
            Err(DirectoryError::Conflict { id, existing, requested }) => {
                assert_eq!(id, "7");
                assert_eq!(existing, "Alice");
                assert_eq!(requested, "Bob");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(dir.resolve("7").unwrap(), "Alice");

        cleanup(&path);
    }

    #[test]
    fn test_reserved_id() {
        let path = temp_path();
        let mut dir = IdentityDirectory::load(&path).unwrap();

        assert_eq!(dir.resolve(RESERVED_ID).unwrap(), BACKGROUND_NAME);
        assert!(matches!(dir.register("0", "Mallory"), Err(DirectoryError::Reserved)));
        assert!(matches!(dir.unregister("0"), Err(DirectoryError::Reserved)));
        assert!(dir.is_empty());

        cleanup(&path);
    }

    #[test]
    fn test_missing_file_bootstraps_empty() {
        let path = temp_path();
        let dir = IdentityDirectory::load(&path).unwrap();
        assert_eq!(dir.len(), 0);
        assert!(matches!(dir.resolve("1"), Err(DirectoryError::NotFound(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_persists_across_reload() {
        let path = temp_path();
        {
            let mut dir = IdentityDirectory::load(&path).unwrap();
            dir.register("1", "Jit").unwrap();
            dir.register("2", "Sneha").unwrap();
        }

        let on_disk: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("0").map(String::as_str), Some(BACKGROUND_NAME));

        let dir = IdentityDirectory::load(&path).unwrap();
        assert_eq!(
            dir.iter().collect::<Vec<_>>(),
            vec![("1", "Jit"), ("2", "Sneha")]
        );

        cleanup(&path);
    }

    #[test]
    fn test_unregister() {
        let path = temp_path();
        let mut dir = IdentityDirectory::load(&path).unwrap();
        dir.register("3", "Deep").unwrap();

        assert_eq!(dir.unregister("3").unwrap(), "Deep");
        assert!(matches!(dir.unregister("3"), Err(DirectoryError::NotFound(_))));

        let reloaded = IdentityDirectory::load(&path).unwrap();
        assert!(matches!(reloaded.resolve("3"), Err(DirectoryError::NotFound(_))));

        cleanup(&path);
    }

    #[test]
    fn test_reserved_entry_restored_on_load() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"0": "Eve", "4": "Vasundhara"}"#).unwrap();

        let dir = IdentityDirectory::load(&path).unwrap();
        assert_eq!(dir.resolve("0").unwrap(), BACKGROUND_NAME);
        assert_eq!(dir.resolve("4").unwrap(), "Vasundhara");

        cleanup(&path);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let path = temp_path();
        let mut dir = IdentityDirectory::load(&path).unwrap();

        assert!(matches!(dir.register("abc", "A"), Err(DirectoryError::InvalidId(_))));
        assert!(matches!(dir.register("", "A"), Err(DirectoryError::InvalidId(_))));
        assert!(matches!(dir.register("5", "  "), Err(DirectoryError::InvalidName(_))));
        assert!(matches!(dir.register("5", "Doe, J"), Err(DirectoryError::InvalidName(_))));
        assert!(dir.is_empty());

        cleanup(&path);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            IdentityDirectory::load(&path),
            Err(DirectoryError::Serialization(_))
        ));

        cleanup(&path);
    }
}
