//! Canned [`MetricsProvider`] implementations.

use kvrt_core::ipc::StatusBody;
use kvrt_core::{MetricsError, MetricsProvider};

/// Always reports the same figures.
#[derive(Debug, Clone, Copy)]
pub struct FixedMetrics(pub StatusBody);

impl Default for FixedMetrics {
    fn default() -> Self {
        Self(StatusBody {
            cpu_cores: 4,
            memory_usage: 1024,
            memory_capacity: 8192,
        })
    }
}

impl MetricsProvider for FixedMetrics {
    fn snapshot(&self) -> Result<StatusBody, MetricsError> {
        Ok(self.0)
    }
}

/// Always fails, for exercising the internal-error path.
#[derive(Debug, Clone, Default)]
pub struct FailingMetrics;

impl MetricsProvider for FailingMetrics {
    fn snapshot(&self) -> Result<StatusBody, MetricsError> {
        Err(MetricsError::Memory("metrics source offline".to_string()))
    }
}
