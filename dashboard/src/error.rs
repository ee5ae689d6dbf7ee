use thiserror::Error;

use crate::types::Patch;

/// The shadow body could not be read as a structured document at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed shadow document for {device}: {reason}")]
pub struct MalformedShadowError {
    pub device: String,
    pub reason: String,
}

/// An edited field holds a value outside its allowed literals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value {value:?} for {unit}.{field}, expected one of {allowed:?}")]
pub struct ValidationError {
    pub unit: String,
    pub field: String,
    pub value: String,
    pub allowed: &'static [&'static str],
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("device {0} is not in edit mode")]
    NotEditing(String),

    #[error("device {0} is already being edited")]
    AlreadyEditing(String),

    #[error("a submit for device {0} is still in flight")]
    SubmitInFlight(String),

    #[error("unit {unit} does not exist on device {device}")]
    UnknownUnit { device: String, unit: String },

    #[error("no snapshot loaded for device {0}")]
    UnknownDevice(String),
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("update service rejected patch for {device}: {source}")]
    Dispatch {
        device: String,
        patch: Patch,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
