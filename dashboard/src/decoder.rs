use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::MalformedShadowError;
use crate::metrics::parse_leading_int;
use crate::types::{DeviceSnapshot, GeneralStatus, UnitRecord};

pub const DEFAULT_UNIT_PREFIX: &str = "Unit_";
const GENERAL_KEY: &str = "General";

/// Decides which `reported` entries are units.
///
/// Returns the sort index of the unit, or `None` when the entry is not a unit.
pub trait UnitSelector: Send + Sync {
    fn select(&self, key: &str, value: &Value) -> Option<u64>;
}

impl<F> UnitSelector for F
where
    F: Fn(&str, &Value) -> Option<u64> + Send + Sync,
{
    fn select(&self, key: &str, value: &Value) -> Option<u64> {
        self(key, value)
    }
}

/// Accepts object-valued keys that start with a fixed prefix.
#[derive(Debug, Clone)]
pub struct PrefixSelector {
    prefix: String,
}

impl PrefixSelector {
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixSelector {
            prefix: prefix.into(),
        }
    }
}

impl UnitSelector for PrefixSelector {
    fn select(&self, key: &str, value: &Value) -> Option<u64> {
        let suffix = key.strip_prefix(self.prefix.as_str())?;
        if !value.is_object() {
            return None;
        }
        // malformed suffixes still count as units, they just sort first
        Some(
            parse_leading_int(suffix)
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0),
        )
    }
}

pub struct ShadowDecoder {
    selector: Box<dyn UnitSelector>,
}

impl Default for ShadowDecoder {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_UNIT_PREFIX)
    }
}

impl ShadowDecoder {
    pub fn new(selector: impl UnitSelector + 'static) -> Self {
        ShadowDecoder {
            selector: Box::new(selector),
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self::new(PrefixSelector::new(prefix))
    }

    /// Parses a raw shadow body.
    pub fn decode_str(&self, device: &str, raw: &str) -> Result<DeviceSnapshot, MalformedShadowError> {
        if raw.trim().is_empty() {
            return Err(malformed(device, "empty document"));
        }
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| malformed(device, &e.to_string()))?;
        self.decode(device, &doc)
    }

    pub fn decode(&self, device: &str, doc: &Value) -> Result<DeviceSnapshot, MalformedShadowError> {
        let root = match doc {
            Value::Object(root) => root,
            Value::Null => return Err(malformed(device, "document is null")),
            _ => return Err(malformed(device, "document is not an object")),
        };

        let state = root.get("state").and_then(Value::as_object);
        let desired = state
            .and_then(|s| s.get("desired"))
            .filter(|d| !d.is_null())
            .cloned();

        let Some(reported) = state.and_then(|s| s.get("reported")).and_then(Value::as_object) else {
            debug!(device, "shadow has no reported state");
            return Ok(DeviceSnapshot::new(device, Vec::new(), None, desired));
        };

        let units = self.units(device, reported);
        let general = general_status(reported);
        debug!(device, units = units.len(), "decoded shadow");
        Ok(DeviceSnapshot::new(device, units, general, desired))
    }

    /// Like [`decode_str`](Self::decode_str) but never fails: a broken
    /// document yields an empty snapshot alongside the error.
    pub fn decode_or_empty(
        &self,
        device: &str,
        raw: &str,
    ) -> (DeviceSnapshot, Option<MalformedShadowError>) {
        match self.decode_str(device, raw) {
            Ok(snapshot) => (snapshot, None),
            Err(e) => {
                warn!(device, error = %e, "falling back to empty snapshot");
                (DeviceSnapshot::empty(device), Some(e))
            }
        }
    }

    fn units(&self, device: &str, reported: &Map<String, Value>) -> Vec<UnitRecord> {
        let mut units: Vec<UnitRecord> = reported
            .iter()
            .filter_map(|(key, value)| {
                let index = self.selector.select(key, value)?;
                let Value::Object(body) = value else {
                    return Some(UnitRecord::new(key.as_str(), index));
                };
                let mut unit = UnitRecord::new(key.as_str(), index);
                for (field, raw) in body {
                    match raw {
                        Value::String(s) => {
                            unit.fields.insert(field.clone(), s.clone());
                        }
                        Value::Number(n) => {
                            unit.fields.insert(field.clone(), n.to_string());
                        }
                        Value::Bool(b) => {
                            unit.fields.insert(field.clone(), b.to_string());
                        }
                        Value::Null => {}
                        Value::Array(_) | Value::Object(_) => {
                            debug!(device, unit = %key, field = %field, "ignoring nested unit field");
                        }
                    }
                }
                Some(unit)
            })
            .collect();

        units.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.key.cmp(&b.key)));
        units
    }
}

pub fn general_status(reported: &Map<String, Value>) -> Option<GeneralStatus> {
    let general = reported.get(GENERAL_KEY)?;
    if !general.is_object() {
        return None;
    }
    serde_json::from_value(general.clone()).ok()
}

fn malformed(device: &str, reason: &str) -> MalformedShadowError {
    MalformedShadowError {
        device: device.to_string(),
        reason: reason.to_string(),
    }
}
