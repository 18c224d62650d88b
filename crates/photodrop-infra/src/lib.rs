//! Photodrop Infrastructure Library
//!
//! Shared infrastructure used by the photodrop binary and pipeline:
//! - Telemetry initialization (tracing subscriber)
//! - Capacity checking (available memory)

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "capacity")]
pub mod capacity;

// Re-export commonly used types
#[cfg(feature = "observability-basic")]
pub use telemetry::init_telemetry;

#[cfg(feature = "capacity")]
pub use capacity::{usable_memory, CapacityChecker, MemoryProbe, SystemMemory};
