//! HAP Runtime - Job scheduling for accessory behaviour
//!
//! This crate contains the control loop that runs accessory jobs. A single
//! cooperative loop drives non-blocking work and deferred callbacks, while
//! jobs declared as blocking are handed to a bounded worker-thread pool so
//! they cannot stall the loop.

mod job;
mod scheduler;

pub use job::*;
pub use scheduler::*;
