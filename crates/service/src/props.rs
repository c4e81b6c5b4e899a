//! Persistent key/value properties
//!
//! A minimal stand-in for the platform property database: one text file
//! of `key=value` lines, rewritten atomically through a sibling temp file.
//! The service stores a single key in it, but the store itself is
//! key-agnostic.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// File-backed property store.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    path: PathBuf,
}

impl PropertyStore {
    /// Use `path` as the backing file. The file does not have to exist
    /// yet; it is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read an integer property, falling back to `default` when the file,
    /// the key or a parseable value is missing.
    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.read_all()
            .ok()
            .and_then(|props| props.get(key).and_then(|value| value.parse().ok()))
            .unwrap_or(default)
    }

    /// Write an integer property, keeping every other key intact.
    pub fn set_i32(&self, key: &str, value: i32) -> io::Result<()> {
        let mut props = self.read_all().unwrap_or_default();
        props.insert(key.to_string(), value.to_string());
        self.write_all(&props)
    }

    fn read_all(&self) -> io::Result<BTreeMap<String, String>> {
        let content = fs::read_to_string(&self.path)?;
        let mut props = BTreeMap::new();
        for line in content.lines() {
            if let Some((key, value)) = line.split_once('=') {
                props.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(props)
    }

    fn write_all(&self, props: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut content = String::new();
        for (key, value) in props {
            content.push_str(key);
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!("persisted {} properties to {}", props.len(), self.path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PropertyStore::open(dir.path().join("props"));
        assert_eq!(store.get_i32("persist.vibrator_mode", 1), 1);
    }

    #[test]
    fn test_set_get_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PropertyStore::open(dir.path().join("props"));
        store.set_i32("persist.vibrator_mode", 2).expect("set");
        assert_eq!(store.get_i32("persist.vibrator_mode", 1), 2);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("props");
        PropertyStore::open(&path)
            .set_i32("persist.vibrator_mode", 0)
            .expect("set");
        let reopened = PropertyStore::open(&path);
        assert_eq!(reopened.get_i32("persist.vibrator_mode", 1), 0);
    }

    #[test]
    fn test_other_keys_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PropertyStore::open(dir.path().join("props"));
        store.set_i32("a", 1).expect("set");
        store.set_i32("b", 2).expect("set");
        store.set_i32("a", 3).expect("set");
        assert_eq!(store.get_i32("a", -1), 3);
        assert_eq!(store.get_i32("b", -1), 2);
    }

    #[test]
    fn test_garbage_value_yields_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("props");
        std::fs::write(&path, "persist.vibrator_mode=banana\n").expect("write");
        let store = PropertyStore::open(&path);
        assert_eq!(store.get_i32("persist.vibrator_mode", 1), 1);
    }

    #[test]
    fn test_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PropertyStore::open(dir.path().join("nested/state/props"));
        store.set_i32("k", 7).expect("set");
        assert_eq!(store.get_i32("k", 0), 7);
    }
}
