#![deny(unsafe_code)]

//! Shared test utilities for the kvrt workspace.
//!
//! Provides a throwaway daemon, config builders, canned metrics providers,
//! and tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! kvrt-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod metrics;
pub mod server;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use metrics::{FailingMetrics, FixedMetrics};
pub use server::TestServer;
