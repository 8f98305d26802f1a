//! Persistence layer for learned state
//!
//! Learned destinations and the consumption tracker survive restarts in a
//! small JSON file. Additional components can store free-form sections.

use crate::error::{LadewerkError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::trips::{ConsumptionState, LearnedDestinations};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persistent state structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub learned_destinations: LearnedDestinations,

    #[serde(default)]
    pub consumption: ConsumptionState,

    /// Free-form sections keyed by component
    #[serde(default)]
    pub sections: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: PathBuf,
    state: PersistentState,
    logger: StructuredLogger,
}

impl PersistenceManager {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Load state from disk. A missing file leaves the defaults in place.
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(&self.file_path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded persistent state: {} learned destinations, {} consumption samples",
            self.state.learned_destinations.len(),
            self.state.consumption.samples.len()
        ));
        Ok(())
    }

    /// Save state to disk, replacing the file atomically
    pub fn save(&mut self) -> Result<()> {
        self.state.updated_at = Some(Utc::now());
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.file_path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.file_path)?;
        self.logger.debug("Saved persistent state to disk");
        Ok(())
    }

    pub const fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn learned_destinations(&self) -> LearnedDestinations {
        self.state.learned_destinations.clone()
    }

    pub fn set_learned_destinations(&mut self, learned: LearnedDestinations) {
        self.state.learned_destinations = learned;
    }

    pub fn consumption(&self) -> ConsumptionState {
        self.state.consumption.clone()
    }

    pub fn set_consumption(&mut self, consumption: ConsumptionState) {
        self.state.consumption = consumption;
    }

    /// Get a typed section, `None` when missing or of another shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .sections
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a typed section
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        if key.trim().is_empty() {
            return Err(LadewerkError::validation("key", "must not be empty"));
        }
        let value = serde_json::to_value(value)?;
        self.state.sections.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sections_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let mut pm = PersistenceManager::new(&path);
        pm.set("overnight", serde_json::json!({"kwh": 3.5})).unwrap();
        pm.save().unwrap();

        let mut reloaded = PersistenceManager::new(&path);
        reloaded.load().unwrap();
        let section: serde_json::Value = reloaded.get("overnight").unwrap();
        assert_eq!(section["kwh"], 3.5);
        assert!(reloaded.state().updated_at.is_some());
        assert!(reloaded.get::<u32>("missing").is_none());
    }
}
