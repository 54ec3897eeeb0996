//! HAP accessory server runtime
//!
//! This crate provides the server side of a smart-accessory protocol:
//! - Entity registry of accessories, services and characteristics
//! - Batched characteristic reads and writes with per-item status
//! - Topic-based change events pushed through a pluggable transport
//! - Persisted server identity and pairing records
//! - The [`Driver`] tying it together on a single control loop

// Re-export core crates
pub use hap_runtime;
pub use hap_types;

pub mod advertiser;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod events;
pub mod model;
pub mod state;
pub mod transport;

pub use advertiser::{AdvertisementInfo, Advertiser, NullAdvertiser};
pub use config::DriverConfig;
pub use dispatch::Dispatcher;
pub use driver::{Driver, DriverBuilder, DriverState};
pub use error::{ConfigError, DriverError, RegistryError, StateError};
pub use events::{EventBus, QueuedEvent};
pub use model::{Accessory, AccessoryInfo, Bridge, Characteristic, Routine, Service};
pub use state::State;
pub use transport::{ClientAddr, NullTransport, Transport};
