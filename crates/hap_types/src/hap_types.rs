//! HAP Types - Core data definitions for the accessory server
//!
//! This crate contains the pure data structures shared by the runtime and the
//! driver: characteristic values and their properties, accessory and instance
//! identifiers, status codes, and the transport-agnostic request/response
//! shapes exchanged with the network layer.

mod category;
mod ids;
mod protocol;
mod status;
mod value;

pub use category::*;
pub use ids::*;
pub use protocol::*;
pub use status::*;
pub use value::*;
