//! On-disk representation of the collection.
//!
//! The whole collection lives in one pretty-printed JSON array. Writes go
//! to a `.tmp` sibling that is then renamed over the target, so readers see
//! either the previous or the next complete array.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::record::Record;

/// Create the collection file as an empty array if it does not exist yet.
///
/// Parent directories are created as needed. Returns `true` when the file
/// was created.
///
/// # Errors
///
/// Returns an error if a directory or the file cannot be created.
pub fn initialize(path: &Path) -> Result<bool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    if path.exists() {
        return Ok(false);
    }

    persist(path, &[])?;
    Ok(true)
}

/// Read the collection file verbatim.
///
/// # Errors
///
/// Returns [`Error::CollectionRead`] if the file cannot be read.
pub fn read_raw(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::CollectionRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and parse the collection file.
///
/// # Errors
///
/// Returns [`Error::CollectionRead`] if the file cannot be read and
/// [`Error::CollectionCorrupt`] if it is not a JSON array of objects.
pub fn load(path: &Path) -> Result<Vec<Record>> {
    let text = read_raw(path)?;
    serde_json::from_str(&text).map_err(|source| Error::CollectionCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the collection file with `records`.
///
/// # Errors
///
/// Returns [`Error::CollectionWrite`] if the temporary file cannot be
/// written or renamed into place. The target is left untouched in that case.
pub fn persist(path: &Path, records: &[Record]) -> Result<()> {
    let body = serde_json::to_string_pretty(records)?;
    let tmp = temp_path(path);

    let written = fs::write(&tmp, body.as_bytes()).and_then(|()| fs::rename(&tmp, path));
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::CollectionWrite {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), records = records.len(), "Collection persisted");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("collection"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64) -> Record {
        Record::from_value(json!({ "id": id })).unwrap()
    }

    #[test]
    fn test_initialize_creates_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");

        assert!(initialize(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_initialize_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/locations.json");

        assert!(initialize(&path).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_initialize_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");
        fs::write(&path, r#"[{"id": 1}]"#).unwrap();

        assert!(!initialize(&path).unwrap());
        assert_eq!(load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");

        persist(&path, &[record(1), record(2)]).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, vec![record(1), record(2)]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_persist_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");

        persist(&path, &[record(7)]).unwrap();
        assert_eq!(read_raw(&path).unwrap(), "[\n  {\n    \"id\": 7\n  }\n]");
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");
        fs::write(&path, "{ definitely not an array").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::CollectionCorrupt { .. }));
    }

    #[test]
    fn test_load_rejects_non_object_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(
            load(&path).unwrap_err(),
            Error::CollectionCorrupt { .. }
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::CollectionRead { .. }));
    }

    #[test]
    fn test_persist_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone/locations.json");

        let err = persist(&path, &[record(1)]).unwrap_err();
        assert!(matches!(err, Error::CollectionWrite { .. }));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/data/locations.json"));
        assert_eq!(tmp, PathBuf::from("/data/locations.json.tmp"));
    }
}
