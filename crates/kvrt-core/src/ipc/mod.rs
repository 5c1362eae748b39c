//! Daemon IPC — Unix domain socket transport for the control plane.
//!
//! Each connection carries exactly one request and one response, both
//! JSON documents followed by a NUL byte. The daemon closes the connection
//! once the response is written.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐        Unix socket         ┌──────────────┐
//! │  client  │───────────────────────────▶│  IPC server  │
//! │  (kvrt)  │  JSON + NUL, one exchange  │  accept loop │
//! └──────────┘                            └──────┬───────┘
//!                                                │ one task per connection
//!                                         ┌──────▼───────┐
//!                                         │  Connection  │──▶ Dispatcher ──▶ MetricsProvider
//!                                         └──────────────┘
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod frame;
pub mod server;
pub mod types;

pub use client::{ClientError, IpcClient, parse_command, render};
pub use codec::{DecodeError, EncodeError};
pub use dispatch::Dispatcher;
pub use kvrt_config::DEFAULT_SOCKET_PATH;
pub use server::{IpcState, ServeReport, serve};
pub use types::*;
