pub mod cli;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod editor;
pub mod error;
pub mod metrics;
pub mod net;
pub mod patch;
pub mod report;
pub mod simulate;
pub mod storage;
pub mod types;

pub use controller::{FleetController, SubmitOutcome, UpdateService};
pub use decoder::{PrefixSelector, ShadowDecoder, UnitSelector};
pub use editor::{DeviceEditor, EditMode, EditSession};
pub use error::{MalformedShadowError, SessionError, SubmitError, ValidationError};
pub use metrics::{Aggregator, FleetMetrics, RevenueBasis, UnitMetrics};
pub use types::{DeviceSnapshot, GeneralStatus, Patch, UnitRecord};
