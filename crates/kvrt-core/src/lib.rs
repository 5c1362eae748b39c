#![deny(unsafe_code)]

//! kvrt core runtime.
//!
//! Provides the control-plane daemon, its wire protocol, and the one-shot
//! client used by the `kvrt` binary.

/// Daemon lifecycle and signal-driven shutdown.
pub mod daemon;
/// Unix socket transport, codec, and dispatch.
pub mod ipc;
/// Host metrics reported by the status command.
pub mod metrics;

pub use daemon::{Daemon, DaemonError, ShutdownSignal};
pub use ipc::IpcClient;
pub use metrics::{HostMetrics, MetricsError, MetricsProvider};
