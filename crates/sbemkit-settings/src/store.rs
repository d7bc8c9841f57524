//! Stage calibration storage
//!
//! The calibration workflow proposes values and only calls
//! [`CalibrationStore::store_stage_calibration`] after the operator confirms.

use crate::config::eht_key;
use crate::error::SettingsResult;
use crate::manager::SettingsManager;
use parking_lot::Mutex;
use sbemkit_core::emit;
use sbemkit_core::event_bus::{AppEvent, SettingsEvent};
use sbemkit_core::{thread_safe, StageCalibration, ThreadSafe};
use std::collections::BTreeMap;

/// Per-EHT stage calibration storage
pub trait CalibrationStore: Send + Sync {
    /// Calibration stored for `eht_kv`, if any.
    fn stage_calibration(&self, eht_kv: f64) -> Option<StageCalibration>;

    /// Persist `calibration` for `eht_kv`.
    fn store_stage_calibration(
        &self,
        eht_kv: f64,
        calibration: StageCalibration,
    ) -> SettingsResult<()>;
}

/// Store that writes through to the settings file
#[derive(Debug, Clone)]
pub struct ConfigCalibrationStore {
    manager: ThreadSafe<SettingsManager>,
}

impl ConfigCalibrationStore {
    /// Wrap a settings manager.
    pub fn new(manager: SettingsManager) -> Self {
        Self {
            manager: thread_safe(manager),
        }
    }

    /// Share an existing settings manager.
    pub fn shared(manager: ThreadSafe<SettingsManager>) -> Self {
        Self { manager }
    }

    /// The wrapped manager.
    pub fn manager(&self) -> ThreadSafe<SettingsManager> {
        self.manager.clone()
    }
}

impl CalibrationStore for ConfigCalibrationStore {
    fn stage_calibration(&self, eht_kv: f64) -> Option<StageCalibration> {
        self.manager.lock().config().stage_calibration_for(eht_kv)
    }

    fn store_stage_calibration(
        &self,
        eht_kv: f64,
        calibration: StageCalibration,
    ) -> SettingsResult<()> {
        calibration
            .validate()
            .map_err(|e| crate::SettingsError::invalid("stage_calibration", e.to_string()))?;
        let mut manager = self.manager.lock();
        let previous = manager.config().stage_calibration_for(eht_kv);
        manager
            .config_mut()
            .set_stage_calibration(eht_kv, calibration);
        if let Err(e) = manager.save() {
            // Keep memory and file consistent.
            match previous {
                Some(previous) => manager.config_mut().set_stage_calibration(eht_kv, previous),
                None => {
                    manager.config_mut().stage_calibration.remove(&eht_key(eht_kv));
                }
            }
            return Err(e);
        }
        emit!(AppEvent::Settings(SettingsEvent::Changed {
            key: format!("stage_calibration.{}", eht_key(eht_kv)),
        }));
        Ok(())
    }
}

/// In-memory store, counting writes
#[derive(Debug, Default)]
pub struct MemoryCalibrationStore {
    entries: Mutex<BTreeMap<String, StageCalibration>>,
    writes: Mutex<usize>,
}

impl MemoryCalibrationStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one entry.
    pub fn with_entry(eht_kv: f64, calibration: StageCalibration) -> Self {
        let store = Self::new();
        store.entries.lock().insert(eht_key(eht_kv), calibration);
        store
    }

    /// Number of successful `store_stage_calibration` calls.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn stage_calibration(&self, eht_kv: f64) -> Option<StageCalibration> {
        self.entries.lock().get(&eht_key(eht_kv)).copied()
    }

    fn store_stage_calibration(
        &self,
        eht_kv: f64,
        calibration: StageCalibration,
    ) -> SettingsResult<()> {
        calibration
            .validate()
            .map_err(|e| crate::SettingsError::invalid("stage_calibration", e.to_string()))?;
        self.entries.lock().insert(eht_key(eht_kv), calibration);
        *self.writes.lock() += 1;
        Ok(())
    }
}
