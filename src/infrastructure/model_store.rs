//! File-backed persistence for fitted model artifacts.
//!
//! Each model name maps to `<dir>/<name>_model.json`. Writes go to a
//! writer-unique temp file that is then renamed over the target, so a reader
//! never observes a half-written artifact and concurrent trainers of the same
//! model simply race to the last complete rename.

use crate::domain::errors::{ForecastError, Result};
use crate::domain::ports::ModelStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores model artifacts as files inside one directory.
#[derive(Debug, Clone)]
pub struct JsonModelStore {
    dir: PathBuf,
}

impl JsonModelStore {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_model.json", name))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        let unique = WRITE_COUNTER.fetch_add(1, Ordering::SeqCst);
        self.dir
            .join(format!(".{}_model.{}.{}.tmp", name, std::process::id(), unique))
    }
}

impl ModelStore for JsonModelStore {
    fn save(&self, name: &str, payload: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ForecastError::persistence(name, e))?;

        let temp_path = self.temp_path_for(name);
        let target = self.path_for(name);

        fs::write(&temp_path, payload).map_err(|e| ForecastError::persistence(name, e))?;
        if let Err(e) = fs::rename(&temp_path, &target) {
            fs::remove_file(&temp_path).ok();
            return Err(ForecastError::persistence(name, e));
        }

        info!("Saved {} model artifact to {:?}", name, target);
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(name);
        if !path.exists() {
            debug!("No stored {} model at {:?}", name, path);
            return Ok(None);
        }

        let payload = fs::read(&path).map_err(|e| ForecastError::persistence(name, e))?;
        info!("Loaded {} model artifact from {:?}", name, path);
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_store() -> (JsonModelStore, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "agriforecast_store_test_{}_{}",
            std::process::id(),
            unique_id
        ));
        (JsonModelStore::new(temp_dir.join("models")), temp_dir)
    }

    fn cleanup_test_dir(temp_dir: PathBuf) {
        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (store, temp_dir) = create_test_store();
        assert!(store.load("arima").unwrap().is_none());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_save_creates_directory_and_roundtrips() {
        let (store, temp_dir) = create_test_store();

        store.save("lstm", b"{\"weights\":[1,2,3]}").unwrap();
        assert!(store.path_for("lstm").exists());

        let loaded = store.load("lstm").unwrap().unwrap();
        assert_eq!(loaded, b"{\"weights\":[1,2,3]}");
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_save_replaces_previous_artifact_without_leftovers() {
        let (store, temp_dir) = create_test_store();

        store.save("arima", b"first").unwrap();
        store.save("arima", b"second").unwrap();

        assert_eq!(store.load("arima").unwrap().unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        cleanup_test_dir(temp_dir);
    }
}
