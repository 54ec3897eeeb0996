//! Entity registry: characteristics, services, accessories and bridges

mod accessory;
mod allocator;
mod bridge;
pub mod catalog;
mod characteristic;
mod registry;
mod service;

pub use accessory::*;
pub use allocator::*;
pub use bridge::*;
pub use characteristic::*;
pub use registry::*;
pub use service::*;
