//! Error types

use hap_runtime::SchedulerError;
use hap_types::{Aid, Iid, ValueError};

use crate::driver::DriverState;

/// Validation errors raised while mutating the accessory registry
///
/// A rejected mutation leaves the registry untouched.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Accessory '{name}' cannot use the reserved standalone aid")]
    ReservedAid { name: String },

    #[error("Root accessory must use the standalone aid, got {0}")]
    RootAid(Aid),

    #[error("Aid {0} is already in use")]
    DuplicateAid(Aid),

    #[error("Aid must be positive")]
    ZeroAid,

    #[error("Cannot add accessory '{name}': the root accessory is not a bridge")]
    NoBridge { name: String },

    #[error("Unknown accessory: {0}")]
    UnknownAccessory(Aid),

    #[error("Unknown characteristic: {aid}.{iid}")]
    UnknownCharacteristic { aid: Aid, iid: Iid },

    #[error("Invalid value for {aid}.{iid}: {source}")]
    InvalidValue {
        aid: Aid,
        iid: Iid,
        #[source]
        source: ValueError,
    },
}

/// Errors loading or saving persisted identity state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid key material in field '{field}'")]
    InvalidKey { field: &'static str },

    #[error("Stored public key does not match the private key")]
    KeyMismatch,
}

/// Errors loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Figment(Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Errors from the driver lifecycle
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Driver cannot start from state {0}")]
    InvalidState(DriverState),

    #[error("Advertiser failed: {0}")]
    Advertiser(anyhow::Error),

    #[error("Transport failed: {0}")]
    Transport(anyhow::Error),
}
