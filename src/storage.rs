use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Namespace key the completion map is stored under.
pub const COMPLETION_NAMESPACE: &str = "travel-schedule-completed";

pub type CompletionMap = BTreeMap<String, bool>;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    JsonDecode(serde_json::Error),
    JsonEncode(serde_json::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::JsonDecode(err) => write!(f, "failed to parse completion map: {err}"),
            StorageError::JsonEncode(err) => write!(f, "failed to encode completion map: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

pub trait CompletionStore {
    fn load(&self) -> Result<CompletionMap, StorageError>;
    fn save(&self, map: &CompletionMap) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct FileCompletionStore {
    path: PathBuf,
}

impl FileCompletionStore {
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(format!("{COMPLETION_NAMESPACE}.json")),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompletionStore for FileCompletionStore {
    fn load(&self) -> Result<CompletionMap, StorageError> {
        load_completion_map(&self.path)
    }

    fn save(&self, map: &CompletionMap) -> Result<(), StorageError> {
        save_completion_map(&self.path, map)
    }
}

pub fn load_completion_map(path: &Path) -> Result<CompletionMap, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(CompletionMap::new()),
        Err(err) => return Err(StorageError::Io(err)),
    };

    if raw.trim().is_empty() {
        return Ok(CompletionMap::new());
    }

    serde_json::from_str(&raw).map_err(StorageError::JsonDecode)
}

pub fn save_completion_map(path: &Path, map: &CompletionMap) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
    }

    let body = serde_json::to_string_pretty(map).map_err(StorageError::JsonEncode)?;
    let mut file = fs::File::create(path).map_err(StorageError::Io)?;
    file.write_all(body.as_bytes()).map_err(StorageError::Io)?;
    file.write_all(b"\n").map_err(StorageError::Io)?;
    debug!(path = %path.display(), entries = map.len(), "saved completion map");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{CompletionMap, CompletionStore, FileCompletionStore, load_completion_map};

    #[test]
    fn missing_file_is_an_empty_map() {
        let dir = tempfile::tempdir().expect("temp dir");
        let map = load_completion_map(&dir.path().join("absent.json")).expect("load");
        assert!(map.is_empty());
    }

    #[test]
    fn round_trips_completion_map() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileCompletionStore::in_dir(&dir.path().join("state"));

        let mut map = CompletionMap::new();
        map.insert("d1-ramen".to_string(), true);
        map.insert("d2-castle".to_string(), false);
        store.save(&map).expect("save should succeed");

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded, map);
        assert!(
            store
                .path()
                .ends_with("travel-schedule-completed.json")
        );
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileCompletionStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").expect("write");
        assert!(store.load().is_err());
    }
}
