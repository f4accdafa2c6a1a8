use crate::domain::errors::{ForecastError, Result};
use crate::domain::ports::ModelStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Process-local model store, used by tests and ephemeral registries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelStore {
    artifacts: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts
            .read()
            .map(|artifacts| artifacts.contains_key(name))
            .unwrap_or(false)
    }
}

impl ModelStore for InMemoryModelStore {
    fn save(&self, name: &str, payload: &[u8]) -> Result<()> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|e| ForecastError::persistence(name, e))?;
        artifacts.insert(name.to_string(), payload.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|e| ForecastError::persistence(name, e))?;
        Ok(artifacts.get(name).cloned())
    }
}
