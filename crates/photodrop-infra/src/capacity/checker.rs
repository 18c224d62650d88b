use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::System;

/// Source of the host's currently available memory.
#[async_trait]
pub trait MemoryProbe: Send + Sync {
    /// Available memory in bytes, or `None` if it could not be read.
    async fn available_memory(&self) -> Option<u64>;
}

/// [`MemoryProbe`] backed by `sysinfo`.
#[derive(Clone)]
pub struct SystemMemory {
    system: Arc<Mutex<System>>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn read_available(&self) -> Option<u64> {
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire system lock for memory check");
                return None;
            }
        };
        system.refresh_memory();
        Some(system.available_memory())
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryProbe for SystemMemory {
    async fn available_memory(&self) -> Option<u64> {
        // refresh_memory reads /proc; keep it off the async workers.
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.read_available()).await {
            Ok(available) => available,
            Err(e) => {
                tracing::error!(error = %e, "Memory probe task failed");
                None
            }
        }
    }
}

/// Memory that may be used after keeping `reserve_percent` of `available` free.
pub fn usable_memory(available: u64, reserve_percent: f64) -> u64 {
    let keep = (1.0 - reserve_percent.clamp(0.0, 100.0) / 100.0).max(0.0);
    (available as f64 * keep) as u64
}

/// Decides whether payloads of known size may be buffered in memory.
#[derive(Clone)]
pub struct CapacityChecker {
    probe: Arc<dyn MemoryProbe>,
    reserve_percent: f64,
}

impl CapacityChecker {
    pub fn new(probe: Arc<dyn MemoryProbe>, reserve_percent: f64) -> Self {
        Self {
            probe,
            reserve_percent,
        }
    }

    /// True if `required_bytes` is strictly below the usable memory.
    ///
    /// An unreadable probe counts as no headroom.
    pub async fn has_memory_for(&self, required_bytes: u64) -> bool {
        let Some(available) = self.probe.available_memory().await else {
            return false;
        };
        let usable = usable_memory(available, self.reserve_percent);
        let fits = usable > required_bytes;
        tracing::debug!(
            available_bytes = available,
            usable_bytes = usable,
            required_bytes,
            fits,
            "Memory capacity check"
        );
        fits
    }
}
