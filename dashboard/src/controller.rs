use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::editor::DeviceEditor;
use crate::error::{SessionError, SubmitError};
use crate::metrics::{Aggregator, FleetMetrics};
use crate::types::{DeviceSnapshot, Patch};

/// Where synthesized patches are sent.
#[async_trait]
pub trait UpdateService: Send + Sync {
    async fn dispatch(&self, device: &str, patch: &Patch) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    NoChanges,
    Dispatched(Patch),
}

struct Slot {
    editor: DeviceEditor,
    in_flight: bool,
}

type Slots = Mutex<HashMap<String, Slot>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight mark when the dispatch finishes or is dropped.
struct InFlight<'a> {
    slots: &'a Slots,
    device: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(slot) = lock(self.slots).get_mut(&self.device) {
            slot.in_flight = false;
        }
    }
}

/// Editors for a fleet, one per device name.
///
/// The map lock is never held across the dispatch await. A device with a
/// submit in flight refuses new edit sessions until the dispatch settles.
pub struct FleetController<S> {
    service: S,
    aggregator: Aggregator,
    slots: Slots,
}

impl<S: UpdateService> FleetController<S> {
    pub fn new(service: S, aggregator: Aggregator) -> Self {
        FleetController {
            service,
            aggregator,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Installs or replaces the snapshot for its device.
    pub fn load(&self, snapshot: DeviceSnapshot) {
        let mut slots = lock(&self.slots);
        match slots.get_mut(snapshot.device()) {
            Some(slot) => slot.editor.refresh(snapshot),
            None => {
                slots.insert(
                    snapshot.device().to_string(),
                    Slot {
                        editor: DeviceEditor::new(snapshot),
                        in_flight: false,
                    },
                );
            }
        }
    }

    pub fn devices(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.slots).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn snapshot(&self, device: &str) -> Option<DeviceSnapshot> {
        lock(&self.slots).get(device).map(|s| s.editor.snapshot().clone())
    }

    pub fn metrics(&self, device: &str) -> Option<FleetMetrics> {
        lock(&self.slots)
            .get(device)
            .map(|s| self.aggregator.fleet(s.editor.snapshot().units()))
    }

    pub fn is_editing(&self, device: &str) -> bool {
        lock(&self.slots)
            .get(device)
            .is_some_and(|s| s.editor.is_editing())
    }

    pub fn is_submitting(&self, device: &str) -> bool {
        lock(&self.slots).get(device).is_some_and(|s| s.in_flight)
    }

    pub fn begin_edit(&self, device: &str) -> Result<(), SessionError> {
        self.with_slot(device, |slot| {
            if slot.in_flight {
                return Err(SessionError::SubmitInFlight(device.to_string()));
            }
            slot.editor.begin_edit().map(|_| ())
        })
    }

    pub fn set_field(&self, device: &str, unit: &str, field: &str, value: &str) -> Result<(), SessionError> {
        self.with_slot(device, |slot| slot.editor.set_field(unit, field, value))
    }

    pub fn cancel(&self, device: &str) -> Result<(), SessionError> {
        self.with_slot(device, |slot| slot.editor.cancel())
    }

    /// Ends the device's edit session and sends whatever changed.
    ///
    /// Edit mode is left before anything is sent, so a failed dispatch
    /// leaves the editor viewing and is only reported back.
    pub async fn submit(&self, device: &str) -> Result<SubmitOutcome, SubmitError> {
        let (patch, _in_flight) = {
            let mut slots = lock(&self.slots);
            let slot = slots
                .get_mut(device)
                .ok_or_else(|| SessionError::UnknownDevice(device.to_string()))?;
            let patch = slot.editor.submit()??;
            if patch.is_empty() {
                info!(device, "submit without changes");
                return Ok(SubmitOutcome::NoChanges);
            }
            slot.in_flight = true;
            let guard = InFlight {
                slots: &self.slots,
                device: device.to_string(),
            };
            (patch, guard)
        };

        info!(device, units = patch.0.len(), fields = patch.field_count(), "dispatching patch");
        match self.service.dispatch(device, &patch).await {
            Ok(()) => Ok(SubmitOutcome::Dispatched(patch)),
            Err(e) => {
                warn!(device, error = %e, "patch dispatch failed");
                Err(SubmitError::Dispatch {
                    device: device.to_string(),
                    patch,
                    source: e.into(),
                })
            }
        }
    }

    fn with_slot<T>(
        &self,
        device: &str,
        f: impl FnOnce(&mut Slot) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut slots = lock(&self.slots);
        let slot = slots
            .get_mut(device)
            .ok_or_else(|| SessionError::UnknownDevice(device.to_string()))?;
        f(slot)
    }
}
