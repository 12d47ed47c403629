//! File-backed cache store
//!
//! Persists the reading as a JSON file in an XDG-compliant cache directory.
//! Writes land in a temporary sibling first and are renamed into place, so a
//! reader never sees a half-written file and concurrent writers resolve as
//! last-writer-wins.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use directories::ProjectDirs;

use super::{CacheEntry, CacheError, CacheStore};

/// Name of the cache file inside the cache directory
const CACHE_FILE_NAME: &str = "tides_cache.json";

/// Distinguishes temp files from overlapping writes in one process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores the cached reading on disk
///
/// Uses `~/.cache/tides-updater/tides_cache.json` on Linux, or the
/// equivalent XDG path on other platforms.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    /// Directory where the cache file lives
    cache_dir: PathBuf,
}

impl FileCacheStore {
    /// Creates a store in the XDG cache directory
    pub fn new() -> Result<Self, CacheError> {
        let project_dirs = ProjectDirs::from("", "", "tides-updater").ok_or(CacheError::NoCacheDir)?;
        Ok(Self {
            cache_dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a store in a custom directory
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }

    fn temp_path(&self) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!(".{}.{}.{}.tmp", CACHE_FILE_NAME, std::process::id(), n))
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self) -> Result<Option<CacheEntry>, CacheError> {
        let content = match fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry = serde_json::from_str(&content)?;
        Ok(Some(entry))
    }

    /// Replaces the cache file with `entry`
    ///
    /// # Arguments
    /// * `entry` - The reading to store
    ///
    /// # Returns
    /// `Ok(())` once the new file is flushed to disk and renamed over the old
    /// one. On error the previous file, if any, is left as it was and the
    /// temporary file is removed.
    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let json = serde_json::to_string_pretty(entry)?;
        let temp = self.temp_path();

        if let Err(e) = write_then_rename(&temp, &self.path(), json.as_bytes()) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        Ok(())
    }
}

fn write_then_rename(temp: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(temp)?;
    file.write_all(contents)?;
    // Data must be on disk before the rename makes it visible
    file.sync_all()?;
    drop(file);
    fs::rename(temp, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{TidePayload, TideReading};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn create_test_store() -> (FileCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileCacheStore::with_dir(temp_dir.path());
        (store, temp_dir)
    }

    fn reading(temp: &str) -> CacheEntry {
        let now = Utc.with_ymd_and_hms(2026, 7, 4, 12, 0, 0).unwrap();
        TideReading::from_payload(
            TidePayload {
                temperature: json!({"metadata": {"id": "8452660"}, "data": [{"v": temp}]}),
                tide: json!({"predictions": [{"v": "3.9", "type": "H"}]}),
            },
            now,
            Duration::minutes(5),
        )
    }

    #[test]
    fn test_get_returns_none_when_never_written() {
        let (store, _temp_dir) = create_test_store();

        assert!(store.get().expect("read should succeed").is_none());
    }

    #[test]
    fn test_put_then_get_returns_same_entry() {
        let (store, _temp_dir) = create_test_store();
        let entry = reading("68.4");

        store.put(&entry).expect("Write should succeed");

        assert_eq!(store.get().unwrap(), Some(entry));
    }

    #[test]
    fn test_put_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store.put(&reading("68.4")).expect("Write should succeed");

        let expected_path = temp_dir.path().join("tides_cache.json");
        assert!(expected_path.exists(), "Cache file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"expires_at\""));
        assert!(content.contains("\"predictions\""));
    }

    #[test]
    fn test_put_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileCacheStore::with_dir(nested_path.clone());

        store.put(&reading("68.4")).expect("Write should succeed");

        assert!(nested_path.join("tides_cache.json").exists());
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let (store, temp_dir) = create_test_store();

        store.put(&reading("68.4")).unwrap();
        store.put(&reading("68.9")).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["tides_cache.json".to_string()]);
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let (store, _temp_dir) = create_test_store();

        store.put(&reading("60.0")).unwrap();
        store.put(&reading("70.0")).unwrap();

        let entry = store.get().unwrap().unwrap();
        assert_eq!(entry, reading("70.0"));
    }

    #[test]
    fn test_entry_survives_new_store_instance() {
        let (store, temp_dir) = create_test_store();
        store.put(&reading("68.4")).unwrap();

        let reopened = FileCacheStore::with_dir(temp_dir.path());

        assert_eq!(reopened.get().unwrap(), Some(reading("68.4")));
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(store.get(), Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_failed_rename_cleans_up_temp_file() {
        let (store, temp_dir) = create_test_store();
        // A non-empty directory where the cache file should be blocks the rename
        fs::create_dir_all(store.path().join("blocker")).unwrap();

        let result = store.put(&reading("68.4"));

        assert!(matches!(result, Err(CacheError::Io(_))));
        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["tides_cache.json".to_string()]);
    }

    #[test]
    fn test_concurrent_writers_leave_a_whole_entry() {
        let (store, _temp_dir) = create_test_store();
        let store = Arc::new(store);
        let candidates: Vec<_> = (0..8).map(|i| reading(&format!("6{}.0", i))).collect();

        let handles: Vec<_> = candidates
            .iter()
            .cloned()
            .map(|entry| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..10 {
                        store.put(&entry).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.get().unwrap().unwrap();
        assert!(candidates.contains(&stored), "Stored entry should be one of the writes");
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Ok(store) = FileCacheStore::new() {
            let path_str = store.path().to_string_lossy().to_string();
            assert!(
                path_str.contains("tides-updater"),
                "Cache path should contain project name"
            );
        }
        // Test passes if new() fails (e.g., no home directory in CI)
    }
}
