//! Capacity checking service
//!
//! Decides whether a payload of known size can be buffered in memory.

pub use checker::{usable_memory, CapacityChecker, MemoryProbe, SystemMemory};

mod checker;
