use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const TIME_CYCLE: &str = "TimeCycle";
pub const IS_ENABLE: &str = "IsEnable";
pub const COUNT_SALE: &str = "CountSale";
pub const COUNT_WARNING: &str = "CountWarning";
pub const COUNT_LIMIT: &str = "CountLimit";
pub const RECORD_COUNT: &str = "RecordCount";
pub const CREDIT_COST: &str = "CreditCost";

/// One dispensing slot of a machine as reported in its shadow.
///
/// Fields stay strings, exactly as they travel on the wire. A missing field
/// means "unknown"; metric code picks the default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub key: String,
    pub index: u64,
    pub fields: BTreeMap<String, String>,
}

impl UnitRecord {
    pub fn new(key: impl Into<String>, index: u64) -> Self {
        UnitRecord {
            key: key.into(),
            index,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// The `General` block some machines publish next to their units.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneralStatus {
    #[serde(rename = "Estado", default)]
    pub status: Option<String>,
    #[serde(rename = "Saldo", default)]
    pub balance: Option<String>,
}

/// Point-in-time decode of one shadow fetch. Replaced, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    device: String,
    units: Vec<UnitRecord>,
    general: Option<GeneralStatus>,
    desired: Option<Value>,
    fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn new(
        device: impl Into<String>,
        units: Vec<UnitRecord>,
        general: Option<GeneralStatus>,
        desired: Option<Value>,
    ) -> Self {
        DeviceSnapshot {
            device: device.into(),
            units,
            general,
            desired,
            fetched_at: Utc::now(),
        }
    }

    pub fn empty(device: impl Into<String>) -> Self {
        Self::new(device, Vec::new(), None, None)
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn units(&self) -> &[UnitRecord] {
        &self.units
    }

    pub fn unit(&self, key: &str) -> Option<&UnitRecord> {
        self.units.iter().find(|u| u.key == key)
    }

    pub fn general(&self) -> Option<&GeneralStatus> {
        self.general.as_ref()
    }

    pub fn desired(&self) -> Option<&Value> {
        self.desired.as_ref()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Sparse set of field changes, keyed by unit name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Patch(pub BTreeMap<String, BTreeMap<String, String>>);

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn changes(&self, unit: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(unit)
    }

    pub fn field_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

// As returned by the backend's thing listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThingSummary {
    pub thing_name: Option<String>,
    pub thing_arn: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub version: Option<i64>,
    pub thing_type_name: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct RefreshRequest<'a> {
    #[serde(rename = "thingName")]
    pub thing_name: ThingRef<'a>,
}

#[derive(Serialize, Debug)]
pub struct ThingRef<'a> {
    #[serde(rename = "thingName")]
    pub thing_name: &'a str,
}
