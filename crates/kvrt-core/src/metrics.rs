//! Host metrics for the status command.
//!
//! The dispatcher only sees the [`MetricsProvider`] trait. [`HostMetrics`]
//! is the production implementation; tests plug in fixed or failing
//! providers, and any `Fn() -> Result<StatusBody, MetricsError>` closure
//! works as a provider too.

use std::sync::Mutex;

use sysinfo::System;

use crate::ipc::types::StatusBody;

/// Errors raised while collecting host metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("CPU core count unavailable: {0}")]
    CpuCount(#[source] std::io::Error),

    #[error("memory statistics unavailable: {0}")]
    Memory(String),
}

/// Synchronous source of host figures.
///
/// Called on the daemon's reactor thread, so implementations must return
/// promptly and must not block on I/O.
pub trait MetricsProvider: Send + Sync {
    fn snapshot(&self) -> Result<StatusBody, MetricsError>;
}

impl<F> MetricsProvider for F
where
    F: Fn() -> Result<StatusBody, MetricsError> + Send + Sync,
{
    fn snapshot(&self) -> Result<StatusBody, MetricsError> {
        self()
    }
}

/// Metrics read from the running host via `sysinfo`.
pub struct HostMetrics {
    system: Mutex<System>,
}

impl HostMetrics {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for HostMetrics {
    fn snapshot(&self) -> Result<StatusBody, MetricsError> {
        let cores = std::thread::available_parallelism().map_err(MetricsError::CpuCount)?;

        let mut system = self
            .system
            .lock()
            .map_err(|_| MetricsError::Memory("system handle poisoned".to_string()))?;
        system.refresh_memory();

        let memory_capacity = system.total_memory();
        if memory_capacity == 0 {
            return Err(MetricsError::Memory(
                "host reported zero total memory".to_string(),
            ));
        }

        Ok(StatusBody {
            cpu_cores: u32::try_from(cores.get()).unwrap_or(u32::MAX),
            memory_usage: system.used_memory(),
            memory_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_metrics_snapshot() {
        let snapshot = HostMetrics::new().snapshot().unwrap();
        assert!(snapshot.cpu_cores >= 1);
        assert!(snapshot.memory_capacity > 0);
        assert!(snapshot.memory_usage <= snapshot.memory_capacity);
    }

    #[test]
    fn test_closure_provider() {
        let fixed = || -> Result<StatusBody, MetricsError> {
            Ok(StatusBody {
                cpu_cores: 2,
                memory_usage: 10,
                memory_capacity: 20,
            })
        };
        assert_eq!(fixed.snapshot().unwrap().cpu_cores, 2);

        let failing =
            || -> Result<StatusBody, MetricsError> { Err(MetricsError::Memory("offline".to_string())) };
        let err = failing.snapshot().unwrap_err();
        assert_eq!(err.to_string(), "memory statistics unavailable: offline");
    }
}
