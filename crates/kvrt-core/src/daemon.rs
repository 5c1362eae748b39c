//! Core daemon process — startup, shutdown, and the serve loop.

use std::sync::Arc;

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{info, warn};

use kvrt_config::{AppConfig, ConfigError};

use crate::ipc::dispatch::Dispatcher;
use crate::ipc::server::{IpcState, ServeReport, serve};
use crate::metrics::{HostMetrics, MetricsProvider};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The kvrt daemon.
pub struct Daemon {
    config: AppConfig,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    _shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    metrics: Arc<dyn MetricsProvider>,
}

impl Daemon {
    /// Create a daemon that reports metrics for the running host.
    pub fn new(config: AppConfig) -> Self {
        Self::with_metrics(config, Arc::new(HostMetrics::new()))
    }

    /// Create a daemon backed by the given metrics provider.
    pub fn with_metrics(config: AppConfig, metrics: Arc<dyn MetricsProvider>) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            shutdown_tx,
            _shutdown_rx,
            metrics,
        }
    }

    /// Run the daemon until a shutdown command, SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<ServeReport, DaemonError> {
        self.config.validate()?;
        let socket_path = self.config.socket_path();
        info!(path = %socket_path.display(), "kvrt daemon starting");

        let state = Arc::new(IpcState {
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&self.metrics))),
            shutdown_tx: self.shutdown_tx.clone(),
            max_message_bytes: self.config.daemon.max_message_bytes,
        });

        // Handlers go in before the socket appears so an early signal is
        // never fatal.
        let mut termination = Termination::install();
        let server = serve(&socket_path, state, self.shutdown_tx.subscribe());
        tokio::pin!(server);

        let report = tokio::select! {
            result = &mut server => result?,
            name = termination.recv() => {
                warn!(signal = name, "initiating graceful shutdown");
                self.shutdown();
                server.await?
            }
        };

        info!("Daemon stopped");
        Ok(report)
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Sender that stops a running daemon from another task.
    pub fn shutdown_handle(&self) -> broadcast::Sender<ShutdownSignal> {
        self.shutdown_tx.clone()
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// SIGINT and SIGTERM listeners.
struct Termination {
    interrupt: Option<Signal>,
    terminate: Option<Signal>,
}

impl Termination {
    fn install() -> Self {
        Self {
            interrupt: listen(SignalKind::interrupt(), "SIGINT"),
            terminate: listen(SignalKind::terminate(), "SIGTERM"),
        }
    }

    /// Resolves with the name of the first signal received.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            Some(()) = next(&mut self.interrupt) => "SIGINT",
            Some(()) = next(&mut self.terminate) => "SIGTERM",
            else => std::future::pending().await,
        }
    }
}

fn listen(kind: SignalKind, name: &'static str) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(signal = name, error = %err, "signal handler unavailable");
            None
        }
    }
}

async fn next(stream: &mut Option<Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::types::StatusBody;
    use crate::metrics::MetricsError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config
            .set_socket_path(dir.path().join("kvrt.sock").to_string_lossy())
            .unwrap();
        config
    }

    #[tokio::test]
    async fn test_daemon_creation() {
        let daemon = Daemon::new(AppConfig::default());
        assert_eq!(daemon.config().daemon.socket_path, "/tmp/kvrt.sock");
    }

    #[tokio::test]
    async fn test_daemon_shutdown() {
        let daemon = Daemon::new(AppConfig::default());

        // Shutdown should not panic
        daemon.shutdown();
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.daemon.socket_path = String::new();

        let err = Daemon::new(config).run().await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[tokio::test]
    async fn test_run_until_shutdown_handle_fires() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let socket_path = config.socket_path();
        let metrics = || -> Result<StatusBody, MetricsError> { Ok(StatusBody::default()) };
        let daemon = Daemon::with_metrics(config, Arc::new(metrics));
        let handle = daemon.shutdown_handle();

        let running = tokio::spawn(async move { daemon.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(socket_path.exists());

        handle.send(ShutdownSignal).unwrap();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.accepted, 0);
        assert!(!socket_path.exists());
    }
}
