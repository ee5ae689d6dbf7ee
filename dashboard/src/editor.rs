use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{SessionError, ValidationError};
use crate::patch;
use crate::types::{DeviceSnapshot, Patch, UnitRecord};

/// Working copy of a device's units, owned by one edit.
#[derive(Debug, Clone)]
pub struct EditSession {
    baseline: Arc<DeviceSnapshot>,
    working: Vec<UnitRecord>,
}

impl EditSession {
    pub fn new(baseline: Arc<DeviceSnapshot>) -> Self {
        let working = baseline.units().to_vec();
        EditSession { baseline, working }
    }

    pub fn baseline(&self) -> &DeviceSnapshot {
        &self.baseline
    }

    pub fn working(&self) -> &[UnitRecord] {
        &self.working
    }

    pub fn set_field(&mut self, unit: &str, field: &str, value: impl Into<String>) -> Result<(), SessionError> {
        let record = self
            .working
            .iter_mut()
            .find(|u| u.key == unit)
            .ok_or_else(|| SessionError::UnknownUnit {
                device: self.baseline.device().to_string(),
                unit: unit.to_string(),
            })?;
        record.fields.insert(field.to_string(), value.into());
        Ok(())
    }

    pub fn synthesize(&self) -> Result<Patch, ValidationError> {
        patch::synthesize(self.baseline.units(), &self.working)
    }
}

#[derive(Debug, Clone, Default)]
pub enum EditMode {
    #[default]
    Viewing,
    Editing(EditSession),
}

/// Viewing/Editing state machine for one device.
#[derive(Debug, Clone)]
pub struct DeviceEditor {
    snapshot: Arc<DeviceSnapshot>,
    mode: EditMode,
}

impl DeviceEditor {
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        DeviceEditor {
            snapshot: Arc::new(snapshot),
            mode: EditMode::Viewing,
        }
    }

    pub fn device(&self) -> &str {
        self.snapshot.device()
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.mode, EditMode::Editing(_))
    }

    pub fn session(&self) -> Option<&EditSession> {
        match &self.mode {
            EditMode::Editing(session) => Some(session),
            EditMode::Viewing => None,
        }
    }

    /// Swaps in a freshly fetched snapshot. A running edit keeps its own
    /// baseline until it is cancelled or submitted.
    pub fn refresh(&mut self, snapshot: DeviceSnapshot) {
        debug!(device = snapshot.device(), editing = self.is_editing(), "snapshot refreshed");
        self.snapshot = Arc::new(snapshot);
    }

    pub fn begin_edit(&mut self) -> Result<&EditSession, SessionError> {
        if self.is_editing() {
            return Err(SessionError::AlreadyEditing(self.device().to_string()));
        }
        info!(device = self.device(), units = self.snapshot.units().len(), "entering edit mode");
        self.mode = EditMode::Editing(EditSession::new(Arc::clone(&self.snapshot)));
        self.session()
            .ok_or_else(|| SessionError::NotEditing(self.device().to_string()))
    }

    pub fn set_field(&mut self, unit: &str, field: &str, value: impl Into<String>) -> Result<(), SessionError> {
        match &mut self.mode {
            EditMode::Editing(session) => session.set_field(unit, field, value),
            EditMode::Viewing => Err(SessionError::NotEditing(self.snapshot.device().to_string())),
        }
    }

    pub fn cancel(&mut self) -> Result<(), SessionError> {
        match std::mem::take(&mut self.mode) {
            EditMode::Editing(_) => {
                info!(device = self.device(), "edit cancelled");
                Ok(())
            }
            EditMode::Viewing => Err(SessionError::NotEditing(self.device().to_string())),
        }
    }

    /// Leaves edit mode and returns the patch for the finished session.
    ///
    /// The editor is back in Viewing whatever the outcome, including a
    /// validation failure. An empty patch means nothing changed.
    pub fn submit(&mut self) -> Result<Result<Patch, ValidationError>, SessionError> {
        match std::mem::take(&mut self.mode) {
            EditMode::Editing(session) => Ok(session.synthesize()),
            EditMode::Viewing => Err(SessionError::NotEditing(self.device().to_string())),
        }
    }
}
